//! Line commands typed on stdin.

use serde_json::Value;

#[derive(Debug, PartialEq)]
pub enum DappCommand {
    Sign(String),
    Tx(Value),
    Quit,
}

#[derive(Debug, PartialEq)]
pub enum WalletCommand {
    List,
    Approve(String),
    Reject { id: String, reason: Option<String> },
    /// End the session for both sides.
    Quit,
    /// Exit but keep the stored session for `--restore`.
    Detach,
}

fn split(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

pub fn parse_dapp(line: &str) -> Result<DappCommand, String> {
    match split(line) {
        ("sign", "") => Err("usage: sign <text>".into()),
        ("sign", text) => Ok(DappCommand::Sign(text.to_string())),
        ("tx", "") => Err("usage: tx <json>".into()),
        ("tx", json) => serde_json::from_str(json)
            .map(DappCommand::Tx)
            .map_err(|e| format!("invalid transaction json: {e}")),
        ("quit" | "exit", _) => Ok(DappCommand::Quit),
        (other, _) => Err(format!("unknown command {other:?}; try sign, tx or quit")),
    }
}

pub fn parse_wallet(line: &str) -> Result<WalletCommand, String> {
    match split(line) {
        ("list" | "ls", _) => Ok(WalletCommand::List),
        ("approve", "") => Err("usage: approve <id>".into()),
        ("approve", id) => Ok(WalletCommand::Approve(id.to_string())),
        ("reject", "") => Err("usage: reject <id> [reason]".into()),
        ("reject", rest) => {
            let (id, reason) = split(rest);
            Ok(WalletCommand::Reject {
                id: id.to_string(),
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            })
        }
        ("quit" | "exit", _) => Ok(WalletCommand::Quit),
        ("detach", _) => Ok(WalletCommand::Detach),
        (other, _) => Err(format!(
            "unknown command {other:?}; try list, approve, reject, detach or quit"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dapp_commands() {
        assert_eq!(
            parse_dapp("sign  hello world "),
            Ok(DappCommand::Sign("hello world".into()))
        );
        assert_eq!(
            parse_dapp(r#"tx {"to":"a","amount":3}"#),
            Ok(DappCommand::Tx(json!({"to": "a", "amount": 3})))
        );
        assert!(parse_dapp("tx {oops").is_err());
        assert!(parse_dapp("sign").is_err());
        assert_eq!(parse_dapp("quit"), Ok(DappCommand::Quit));
        assert!(parse_dapp("dance").is_err());
    }

    #[test]
    fn wallet_commands() {
        assert_eq!(parse_wallet("approve abc"), Ok(WalletCommand::Approve("abc".into())));
        assert_eq!(
            parse_wallet("reject abc too expensive"),
            Ok(WalletCommand::Reject {
                id: "abc".into(),
                reason: Some("too expensive".into())
            })
        );
        assert_eq!(
            parse_wallet("reject abc"),
            Ok(WalletCommand::Reject {
                id: "abc".into(),
                reason: None
            })
        );
        assert_eq!(parse_wallet("ls"), Ok(WalletCommand::List));
        assert_eq!(parse_wallet("detach"), Ok(WalletCommand::Detach));
        assert!(parse_wallet("approve").is_err());
    }
}
