//! Parsing of lines typed into the terminal client

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Public(String),
    Private { recipient: String, body: String },
    Quit,
    Help,
    Empty,
}

impl Command {
    /// `/msg <name> <text>` sends privately, `/quit` leaves, `/help` lists
    /// the commands, anything else goes to everyone.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(Command::Empty);
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Public(line.to_string()));
        };

        let (command, args) = rest.split_once(' ').unwrap_or((rest, ""));
        match command {
            "quit" | "q" => Ok(Command::Quit),
            "help" | "h" => Ok(Command::Help),
            "msg" | "m" => {
                let args = args.trim_start();
                match args.split_once(' ') {
                    Some((recipient, body)) if !body.trim().is_empty() => Ok(Command::Private {
                        recipient: recipient.to_string(),
                        body: body.to_string(),
                    }),
                    _ => Err("usage: /msg <name> <message>".to_string()),
                }
            }
            other => Err(format!("unknown command /{}", other)),
        }
    }
}

pub const HELP: &str = "Commands:
  <message>              send to everyone
  /msg <name> <message>  send privately
  /quit                  leave the chat";
