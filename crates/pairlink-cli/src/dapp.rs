use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use pl_proto::AppInfo;
use pl_session::{DappInitiator, SessionConfig, SessionEvent, WebSocketConnector};

use crate::commands::{parse_dapp, DappCommand};

pub async fn run(config: SessionConfig, app: AppInfo) -> Result<()> {
    let mut dapp = DappInitiator::new(config, Arc::new(WebSocketConnector::new()));
    let mut events = dapp.subscribe();
    let created = match dapp.create_session().await {
        Ok(created) => created,
        Err(e) => bail!("could not open session: {e}"),
    };
    info!(session_id = %created.session_id, "session created");
    println!("pairing code (paste into the wallet):");
    println!("{}", created.pairing_code);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut connect_sent = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Connected { session_id } => {
                        println!("wallet joined session {session_id}");
                        if !connect_sent {
                            match dapp.request_connect(&app).await {
                                Ok(id) => println!("connect request {id} sent"),
                                Err(e) => warn!(error = %e, "connect request failed"),
                            }
                            connect_sent = true;
                        }
                        println!("commands: sign <text> | tx <json> | quit");
                    }
                    SessionEvent::Response(response) => {
                        if response.approved {
                            let result = response.result.unwrap_or_default();
                            println!("{:?} request {} approved: {result}", response.kind, response.id);
                        } else {
                            let reason = response.reason.as_deref().unwrap_or("no reason given");
                            println!("{:?} request {} rejected: {reason}", response.kind, response.id);
                        }
                    }
                    SessionEvent::Disconnected { reason, .. } => {
                        println!("session ended ({reason:?})");
                        return Ok(());
                    }
                    SessionEvent::Error(err) => warn!(kind = ?err.kind, "{}", err.message),
                    SessionEvent::Request(_) => {}
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let sent = match parse_dapp(&line) {
                    Ok(DappCommand::Sign(text)) => dapp.request_sign_message(&text).await,
                    Ok(DappCommand::Tx(tx)) => dapp.request_sign_transaction(tx).await,
                    Ok(DappCommand::Quit) => break,
                    Err(usage) => {
                        eprintln!("{usage}");
                        continue;
                    }
                };
                match sent {
                    Ok(id) => println!("request {id} sent"),
                    Err(e) => eprintln!("request failed: {e}"),
                }
            }
        }
    }
    dapp.disconnect().await;
    Ok(())
}
