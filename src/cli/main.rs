use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use line_search::api::handlers::SearchResponse;
use reqwest::{Client, Response};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "line-search-cli")]
#[command(about = "Line Search CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "LINE_SEARCH_ENDPOINT", default_value = "http://localhost:8501")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one page of matches
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Continue from a cursor printed by a previous call
        #[arg(short, long, conflicts_with = "page")]
        cursor: Option<String>,

        /// Fetch a numbered page with offset paging
        #[arg(short, long)]
        page: Option<u64>,

        #[arg(short = 's', long)]
        page_size: Option<usize>,

        /// Match the whole line instead of a substring
        #[arg(short = 'x', long)]
        exact: bool,

        #[arg(short = 'C', long)]
        case_sensitive: bool,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Download every match as text
    Export {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Prefix each line with file:line
        #[arg(short, long)]
        annotated: bool,

        #[arg(short = 'x', long)]
        exact: bool,

        #[arg(short = 'C', long)]
        case_sensitive: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check server and backend health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Search {
            query,
            cursor,
            page,
            page_size,
            exact,
            case_sensitive,
            json,
        } => {
            let mut params: Vec<(&str, String)> = vec![
                ("q", query),
                ("mode", mode(exact).to_string()),
                ("case_sensitive", case_sensitive.to_string()),
            ];
            if let Some(cursor) = cursor {
                params.push(("cursor", cursor));
            }
            if let Some(page) = page {
                params.push(("page", page.to_string()));
            }
            if let Some(page_size) = page_size {
                params.push(("page_size", page_size.to_string()));
            }

            let response = client
                .get(format!("{}/search", cli.endpoint))
                .query(&params)
                .send()
                .await
                .context("search request failed")?;
            let response = check(response).await?;

            if json {
                let body: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                let body: SearchResponse = response.json().await?;
                for record in &body.results {
                    println!(
                        "{}:{}\t{}",
                        record.source_file, record.line_number, record.content
                    );
                }
                eprintln!(
                    "{} shown, {} total{}",
                    body.results.len(),
                    body.total_results,
                    if body.exhausted { ", no more pages" } else { "" }
                );
                if let Some(next) = body.next_cursor {
                    eprintln!("next cursor: {}", next);
                }
            }
        }

        Commands::Export {
            query,
            annotated,
            exact,
            case_sensitive,
            output,
        } => {
            let format = if annotated { "annotated" } else { "plain" };
            let response = client
                .get(format!("{}/export", cli.endpoint))
                .query(&[
                    ("q", query.as_str()),
                    ("mode", mode(exact)),
                    ("case_sensitive", if case_sensitive { "true" } else { "false" }),
                    ("format", format),
                ])
                .send()
                .await
                .context("export request failed")?;
            let text = check(response).await?.text().await?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("{} lines written to {}", text.lines().count(), path.display());
                }
                None => println!("{}", text),
            }
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await
                .context("health request failed")?;
            let healthy = response.status().is_success();

            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            if !healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn mode(exact: bool) -> &'static str {
    if exact {
        "exact_match"
    } else {
        "substring"
    }
}

/// Turn an error body into an `anyhow` error
async fn check(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let message = body["error"]["message"].as_str().unwrap_or("no error message");
    bail!("server returned {}: {}", status, message)
}
