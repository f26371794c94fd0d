//! openpipe command-line client
//!
//! Runs chat completions through the interceptor and generates configuration
//! templates.

use clap::Parser;
use futures::StreamExt;
use openpipe::cli::{Cli, Command, build_chat_request, generate_config_template};
use openpipe::interceptor::{CompletionResponse, Interceptor};
use openpipe::{config::Config, telemetry};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Config { output }) => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Wrote configuration template to {}", path);
                }
                None => print!("{}", template),
            }
            Ok(())
        }
        Some(Command::Chat {
            model,
            message,
            system,
            stream,
            tags,
            print_metrics,
        }) => {
            let config = Config::from_file(&cli.config)?;
            telemetry::init(&config.observability.log_level);

            let interceptor = Interceptor::from_config(&config)?;
            let request = build_chat_request(&model, system.as_deref(), &message, stream, &tags);

            match interceptor.create(request).await? {
                CompletionResponse::Whole(completion) => {
                    println!("{}", completion.first_content().unwrap_or_default());
                }
                CompletionResponse::Stream(mut chunks) => {
                    let mut stdout = std::io::stdout();
                    while let Some(chunk) = chunks.next().await {
                        let chunk = chunk?;
                        let text = chunk
                            .choices
                            .iter()
                            .filter(|choice| choice.index == 0)
                            .filter_map(|choice| choice.delta.content.as_deref());
                        for fragment in text {
                            write!(stdout, "{}", fragment)?;
                        }
                        stdout.flush()?;
                    }
                    writeln!(stdout)?;
                }
            }

            if print_metrics {
                print!("{}", interceptor.metrics().gather()?);
            }
            Ok(())
        }
        None => {
            eprintln!("No command given; run `openpipe --help` for usage");
            Ok(())
        }
    }
}
