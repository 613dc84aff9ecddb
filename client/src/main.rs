mod input;

use clap::Parser;
use client::{ChatClient, ClientError, ClientEvent};
use input::{Command, HELP};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:12435")]
    server: String,

    /// Display name to join with
    #[arg(short = 'n', long)]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    info!("Connecting to {} as {}", args.server, args.name);
    let (mut chat, mut events) = ChatClient::connect(&args.server, &args.name).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Joined { name }) => {
                    println!("Joined as {}. Type /help for commands.", name);
                }
                Some(ClientEvent::ChatLine(line)) => println!("{}", line),
                Some(ClientEvent::UserListUpdated(names)) => {
                    println!("Online: {}", names.join(", "));
                }
                Some(ClientEvent::Rejected { name, reason }) => {
                    eprintln!("Cannot join as {}: {}", name, reason);
                    return Ok(());
                }
                Some(ClientEvent::Error(notice)) => eprintln!("{}", notice),
                Some(ClientEvent::Disconnected) | None => {
                    println!("Disconnected from server");
                    return Ok(());
                }
            },

            line = lines.next_line() => {
                let Some(line) = line? else {
                    chat.leave().await?;
                    return Ok(());
                };

                let sent = match Command::parse(&line) {
                    Ok(Command::Public(body)) => chat.send_public(body).await,
                    Ok(Command::Private { recipient, body }) => {
                        chat.send_private(recipient, body).await
                    }
                    Ok(Command::Quit) => {
                        chat.leave().await?;
                        return Ok(());
                    }
                    Ok(Command::Help) => {
                        println!("{}", HELP);
                        Ok(())
                    }
                    Ok(Command::Empty) => Ok(()),
                    Err(message) => {
                        eprintln!("{}", message);
                        Ok(())
                    }
                };

                match sent {
                    Err(e @ ClientError::BodyTooLong { .. }) => eprintln!("{}", e),
                    other => other?,
                }
            },
        }
    }
}
