// src/tasks/chat.rs

//! A minimal line-oriented chat protocol.
//!
//! Each read is one message. The first non-whitespace character selects the
//! command and the rest of the message holds its arguments:
//!
//! | message        | effect                                      |
//! |----------------|---------------------------------------------|
//! | `h <id>`       | take the id `<id>` and get a greeting back   |
//! | `b <msg>`      | send `<msg>` to everyone, sender included    |
//! | `u <id> <msg>` | send `<msg>` to the first client named `<id>`|
//! | `l <msg>`      | write `<msg>` to the server log             |
//! | `e <msg>`      | echo `<msg>` back                           |
//! | `d`            | disconnect                                  |

use crate::connection::ConnectionContext;
use crate::core::{Action, SpindleError, Task};

#[derive(Debug, Default)]
pub struct ChatTask;

impl ChatTask {
    pub fn new() -> Self {
        Self
    }
}

/// Splits `text` into its first whitespace-delimited word and the trimmed rest.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim()),
        None => (text, ""),
    }
}

fn required<'a>(value: &'a str, what: &str, command: char) -> Result<&'a str, SpindleError> {
    if value.is_empty() {
        Err(SpindleError::MalformedInput(format!(
            "'{command}' requires {what}"
        )))
    } else {
        Ok(value)
    }
}

impl Task for ChatTask {
    type State = ();

    fn parse(
        &mut self,
        conn: &mut ConnectionContext<()>,
        buffer: &[u8],
    ) -> Result<Action, SpindleError> {
        let text = std::str::from_utf8(buffer)?.trim();
        let mut chars = text.chars();
        let command = chars
            .next()
            .ok_or_else(|| SpindleError::MalformedInput("empty message".into()))?;
        let args = chars.as_str().trim();

        match command {
            'h' => {
                let (id, _) = split_word(args);
                let id = required(id, "an id", command)?;
                conn.set_id(id);
                conn.response(format!("Hello '{id}'."));
                conn.read();
            }
            'b' => {
                let message = required(args, "a message", command)?;
                conn.broadcast(message.to_owned());
                conn.read();
            }
            'u' => {
                let (id, message) = split_word(args);
                let id = required(id, "a receiver id", command)?;
                let message = required(message, "a message", command)?;
                conn.unicast(id, message.to_owned());
                conn.read();
            }
            'l' => {
                let message = required(args, "a message", command)?;
                conn.log(message.as_bytes());
                conn.read();
            }
            'e' => {
                conn.response(args.to_owned());
                conn.read();
            }
            'd' => {
                conn.disconnect();
            }
            other => {
                conn.response(format!("Unknown command '{other}'."));
                conn.read();
            }
        }

        Ok(Action::Process)
    }
}
