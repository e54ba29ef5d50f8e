//! Interactive chat client.

use anyhow::Result;
use shared::{Action, Envelope};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::relay_client::{self, ClientError};

/// One line of terminal output for an envelope.
pub fn render(env: &Envelope, own_id: Option<&str>) -> String {
    let is_self = |id: &str| own_id == Some(id);
    match env.action {
        Action::Connect if is_self(&env.contents) => format!("* connected as {}", env.contents),
        Action::Connect => format!("* {} joined", env.contents),
        Action::Disconnect => format!("* {} left", env.contents),
        Action::Error => format!("! {}", env.contents),
        Action::Chat if is_self(&env.sender) => format!("<me> {}", env.contents),
        Action::Chat => format!("<{}> {}", env.sender, env.contents),
    }
}

pub async fn run(addr: &str) -> Result<()> {
    let (mut writer, mut reader) = relay_client::connect(addr).await?;
    tracing::info!("Connected to relayer at {}", addr);

    let mut own_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            env = reader.next_envelope() => match env {
                Ok(env) => {
                    if own_id.is_none() && env.action == Action::Connect && env.is_system() {
                        own_id = Some(env.contents.clone());
                    }
                    println!("{}", render(&env, own_id.as_deref()));
                }
                Err(ClientError::Envelope(e)) => tracing::warn!("undecodable frame: {}", e),
                Err(ClientError::Closed) => {
                    println!("* connection closed");
                    break;
                }
                Err(e) => return Err(e.into()),
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    writer
                        .send_chat(own_id.as_deref().unwrap_or_default(), &line)
                        .await?;
                }
                None => {
                    let _ = writer.close().await;
                    break;
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lifecycle_and_chat() {
        let me = Some("me-1");
        assert_eq!(
            render(&Envelope::system(Action::Connect, "me-1"), me),
            "* connected as me-1"
        );
        assert_eq!(
            render(&Envelope::system(Action::Connect, "other"), me),
            "* other joined"
        );
        assert_eq!(
            render(&Envelope::system(Action::Disconnect, "other"), me),
            "* other left"
        );
        assert_eq!(render(&Envelope::chat("me-1", "hi"), me), "<me> hi");
        assert_eq!(render(&Envelope::chat("other", "yo"), me), "<other> yo");
        assert_eq!(
            render(&Envelope::system(Action::Error, "bad message"), None),
            "! bad message"
        );
    }
}
