use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use lakechat::chat::{ChatClient, strip_reply};
use lakechat::config::AppConfig;
use lakechat::discovery::DiscoveryClient;
use lakechat::extract::DocumentExtractor;
use lakechat::query::{ProfileQueries, QueryClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export LAKECHAT_GATEWAY_URL=https://gateway.example.com/api/v1");
        eprintln!("  export LAKECHAT_API_KEY=...");
        std::process::exit(1);
    });

    eprintln!("💬 LakeChat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Gateway: {}", config.gateway.base_url);
    eprintln!("   Model: {}", config.gateway.model);

    let chat = ChatClient::new(config.gateway);
    eprintln!("   Session: {}", chat.session_id());

    // ── Optional services ───────────────────────────────────────────────
    let profiles = match config.query {
        Some(query_config) => {
            eprintln!(
                "   Query service: {} ({}.{})",
                query_config.base_url, query_config.database, query_config.table
            );
            Some(ProfileQueries::new(QueryClient::new(query_config)))
        }
        None => {
            eprintln!("   Query service: disabled");
            None
        }
    };

    let discovery = match config.discovery {
        Some(discovery_config) => {
            eprintln!("   Discovery: {}", discovery_config.base_url);
            Some(DiscoveryClient::new(discovery_config))
        }
        None => {
            eprintln!("   Discovery: disabled");
            None
        }
    };

    let extractor = match config.extractor {
        Some(extractor_config) => {
            eprintln!("   Extraction: {}", extractor_config.base_url);
            Some(DocumentExtractor::new(extractor_config))
        }
        None => {
            eprintln!("   Extraction: disabled");
            None
        }
    };

    eprintln!("   Type a message and press Enter. /help for commands, /quit to exit.\n");

    // ── REPL ────────────────────────────────────────────────────────────
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();
    let mut learning_style: Option<String> = None;

    eprint!("> ");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, arg) = match command.split_once(' ') {
                Some((name, arg)) => (name, arg.trim()),
                None => (command, ""),
            };
            match name {
                "quit" | "exit" => break,
                "help" => print_help(),
                "style" => {
                    if arg.is_empty() {
                        learning_style = None;
                        eprintln!("Learning style cleared.");
                    } else {
                        learning_style = Some(arg.to_string());
                        eprintln!("Answers will be tailored to: {}", arg);
                    }
                }
                "load" => match &extractor {
                    Some(extractor) if !arg.is_empty() => {
                        match extractor.extract_file(arg).await {
                            Ok(text) => {
                                eprintln!("Attached {} characters of document text.", text.len());
                                chat.attach_document(text).await;
                            }
                            Err(e) => eprintln!("Extraction failed: {}", e),
                        }
                    }
                    Some(_) => eprintln!("Usage: /load <path>"),
                    None => eprintln!("Extraction disabled (set LAKECHAT_EXTRACTOR_URL)."),
                },
                "drop" => {
                    chat.clear_document().await;
                    eprintln!("Document detached.");
                }
                "users" => match &profiles {
                    Some(profiles) => match profiles.list_user_ids().await {
                        Ok(users) => {
                            for user in users {
                                println!("{}", user);
                            }
                        }
                        Err(e) => eprintln!("Query failed: {}", e),
                    },
                    None => eprintln!("Query service disabled (set LAKECHAT_QUERY_URL)."),
                },
                "counts" => match &profiles {
                    Some(profiles) if !arg.is_empty() => {
                        match profiles.document_type_counts(arg).await {
                            Ok(counts) if counts.is_empty() => {
                                println!("No activity recorded for {}.", arg);
                            }
                            Ok(counts) => {
                                let mut rows: Vec<_> = counts.into_iter().collect();
                                rows.sort();
                                for (doc_type, count) in rows {
                                    println!("{}: {}", doc_type, count);
                                }
                            }
                            Err(e) => eprintln!("Query failed: {}", e),
                        }
                    }
                    Some(_) => eprintln!("Usage: /counts <user>"),
                    None => eprintln!("Query service disabled (set LAKECHAT_QUERY_URL)."),
                },
                "plan" => match &profiles {
                    Some(profiles) if !arg.is_empty() => {
                        match explain_plan(profiles, &chat, arg).await {
                            Ok(explanation) => println!("\n{}\n", strip_reply(&explanation)),
                            Err(e) => eprintln!("Plan selection failed: {}", e),
                        }
                    }
                    Some(_) => eprintln!("Usage: /plan <user>"),
                    None => eprintln!("Query service disabled (set LAKECHAT_QUERY_URL)."),
                },
                "discover" => match &discovery {
                    Some(discovery) if !arg.is_empty() => {
                        let run = discovery
                            .await_run(arg, |event| {
                                if let Some(text) = event.text() {
                                    println!("  {}", text);
                                }
                            })
                            .await;
                        match run {
                            Ok(summary) => println!(
                                "Run complete: {} assets discovered from {}.",
                                summary.assets_discovered, summary.source
                            ),
                            Err(e) => eprintln!("Discovery run failed: {}", e),
                        }
                    }
                    Some(_) => eprintln!("Usage: /discover <source>"),
                    None => eprintln!("Discovery disabled (set LAKECHAT_DISCOVERY_URL)."),
                },
                other => eprintln!("Unknown command /{}. /help lists commands.", other),
            }
        } else {
            match chat
                .send_with_learning_style(line, learning_style.as_deref())
                .await
            {
                Ok(reply) => {
                    println!("\n{}\n", strip_reply(&reply.content));
                    if let Some(usage) = reply.usage {
                        debug!(
                            input = usage.input_tokens,
                            output = usage.output_tokens,
                            "token usage"
                        );
                    }
                }
                // The conversation keeps going; errors land in the
                // transcript like any other reply.
                Err(e) => println!("\n{}\n", e.transcript_message()),
            }
        }
        eprint!("> ");
    }

    Ok(())
}

async fn explain_plan(
    profiles: &ProfileQueries,
    chat: &ChatClient,
    user: &str,
) -> lakechat::Result<String> {
    let counts = profiles.document_type_counts(user).await?;
    let explanation = profiles
        .explain_customization(chat, user, &counts, chat.model())
        .await?;
    Ok(explanation)
}

fn print_help() {
    eprintln!("Commands:");
    eprintln!("  /users              list learner ids from the activity table");
    eprintln!("  /counts <user>      per-document-type activity counts for a learner");
    eprintln!("  /plan <user>        pick and explain a learning plan for a learner");
    eprintln!("  /style <style>      tailor replies to a learning style (no arg clears)");
    eprintln!("  /load <path>        extract a document and attach it to the chat");
    eprintln!("  /drop               detach the current document");
    eprintln!("  /discover <source>  run catalog discovery and print assets as found");
    eprintln!("  /quit               exit");
}
