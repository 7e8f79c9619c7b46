use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;

use zdaemon_rs::daemon::config::DaemonConfig;
use zdaemon_rs::daemon::server;
use zdaemon_rs::engine::selector::{DrawSource, FixedDraw, RandomDraw};
use zdaemon_rs::engine::{MessageContext, Platform, TriggerLoader, TriggerRouter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Daemon configuration file
        #[arg(short, long, default_value = "zdaemon.yaml")]
        config: PathBuf,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate a trigger file
    Check {
        /// Trigger file
        #[arg(short, long)]
        triggers: PathBuf,

        /// Print the file as it would be written back
        #[arg(long)]
        dump: bool,
    },
    /// Run one message through the triggers without sending anything
    Eval {
        /// Trigger file
        #[arg(short, long)]
        triggers: PathBuf,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// Topic, or `slack`
        #[arg(short, long, default_value = "zdaemon")]
        instance: String,

        #[arg(short, long, default_value = "someone")]
        sender: String,

        /// Defaults to the sender
        #[arg(long)]
        display_sender: Option<String>,

        #[arg(long, default_value = "")]
        channel: String,

        #[arg(long, default_value = "slack")]
        platform: Platform,

        /// Fixed draw in 0..100 instead of a random one
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..100))]
        draw: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Serve { config, port } => {
            let mut config = DaemonConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;

            let set = TriggerLoader::new().load_file(&config.triggers_file)?;
            let router = TriggerRouter::from_set(set)
                .with_exempt_platforms(config.special_timeout_exempt.iter().copied());

            server::serve(&config, router).await?;
        }
        Commands::Check { triggers, dump } => {
            let set = TriggerLoader::new().load_file(&triggers)?;

            println!(
                "{}: {} trigger(s), special timeout {}s",
                triggers.display(),
                set.rules().len(),
                set.timeout_s()
            );
            for rule in set.rules() {
                println!(
                    "  [{}] weights {}/100{}{}{}",
                    rule.index,
                    rule.responses.total_weight(),
                    if rule.responses.has_default() { ", default" } else { "" },
                    if rule.enforce_special_timeout { ", special" } else { "" },
                    if rule.send_cubes_count > 0 {
                        format!(", {} cube(s)", rule.send_cubes_count)
                    } else {
                        String::new()
                    },
                );
            }

            if dump {
                print!("{}", set.to_yaml()?);
            }
        }
        Commands::Eval {
            triggers,
            message,
            instance,
            sender,
            display_sender,
            channel,
            platform,
            draw,
        } => {
            let set = TriggerLoader::new().load_file(&triggers)?;
            let router = TriggerRouter::from_set(set);

            let mut ctx = MessageContext::new(instance, sender, message).with_channel(channel);
            if let Some(display_sender) = display_sender {
                ctx = ctx.with_display_sender(display_sender);
            }

            let mut source: Box<dyn DrawSource> = match draw {
                Some(value) => Box::new(FixedDraw(value)),
                None => Box::new(RandomDraw),
            };
            let outcomes = router.route_with(&ctx, platform, Utc::now(), source.as_mut());

            if outcomes.is_empty() {
                println!("No trigger fired");
            } else {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            }
        }
    }

    Ok(())
}
