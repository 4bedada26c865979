use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use pl_session::{
    SessionConfig, SessionEvent, SignRequest, WalletClient, WalletSigner, WebSocketConnector,
};
use pl_store::FileStore;

use crate::commands::{parse_wallet, WalletCommand};
use crate::signer::DemoSigner;

const SIGNER_FILE: &str = "demo-signer.key";

fn describe(request: &SignRequest) -> String {
    format!(
        "[{}] {:?} from {} at {}: {}",
        request.id,
        request.kind,
        request.origin,
        request.timestamp.format("%H:%M:%S"),
        request.data
    )
}

pub async fn run(
    config: SessionConfig,
    code: Option<String>,
    restore: bool,
    data_dir: PathBuf,
    auto_approve: bool,
) -> Result<()> {
    let store = FileStore::open(data_dir.join("sessions"))
        .with_context(|| format!("opening store in {}", data_dir.display()))?;
    let signer = DemoSigner::load_or_create(&data_dir.join(SIGNER_FILE))?;
    info!(address = %signer.address(), "demo signer ready");

    let mut wallet = WalletClient::new(
        config,
        Arc::new(WebSocketConnector::new()),
        Arc::new(store),
    );
    let mut events = wallet.subscribe();

    let joined = match (code, restore) {
        (Some(code), _) => wallet.connect_from_qr(&code).await,
        (None, true) => wallet.restore_session().await,
        (None, false) => bail!("pass a pairing code or --restore"),
    };
    if !joined {
        while let Some(SessionEvent::Error(err)) = events.try_recv() {
            eprintln!("error: {}", err.message);
        }
        bail!("could not join session");
    }
    println!("commands: list | approve <id> | reject <id> [reason] | detach | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Connected { session_id } => {
                        println!("paired with dApp, session {session_id}");
                    }
                    SessionEvent::Request(request) => {
                        println!("request {}", describe(&request));
                        if auto_approve {
                            match wallet.approve_with_signer(&request.id, &signer).await {
                                Ok(()) => println!("approved {}", request.id),
                                Err(e) => warn!(request_id = %request.id, error = %e, "auto-approve failed"),
                            }
                        }
                    }
                    SessionEvent::Disconnected { reason, .. } => {
                        println!("session ended ({reason:?})");
                        return Ok(());
                    }
                    SessionEvent::Error(err) => warn!(kind = ?err.kind, "{}", err.message),
                    SessionEvent::Response(_) => {}
                }
            }
            line = lines.next_line() => {
                // EOF keeps the stored session so `--restore` can pick it up
                let Some(line) = line? else { return Ok(()) };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_wallet(&line) {
                    Ok(WalletCommand::List) => {
                        let pending = wallet.pending_requests();
                        if pending.is_empty() {
                            println!("no pending requests");
                        }
                        for request in pending {
                            println!("{}", describe(&request));
                        }
                    }
                    Ok(WalletCommand::Approve(id)) => {
                        match wallet.approve_with_signer(&id, &signer).await {
                            Ok(()) => println!("approved {id}"),
                            Err(e) => eprintln!("approve failed: {e}"),
                        }
                    }
                    Ok(WalletCommand::Reject { id, reason }) => {
                        match wallet.reject_request(&id, reason).await {
                            Ok(()) => println!("rejected {id}"),
                            Err(e) => eprintln!("reject failed: {e}"),
                        }
                    }
                    Ok(WalletCommand::Detach) => return Ok(()),
                    Ok(WalletCommand::Quit) => break,
                    Err(usage) => eprintln!("{usage}"),
                }
            }
        }
    }
    wallet.disconnect().await;
    Ok(())
}
