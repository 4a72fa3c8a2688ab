//! IP blacklist screen: newest entries first.

use balancer_types::BlacklistedIp;
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::reconcile::{Action, Collection, ReconcileError, decode_tagged, reconcile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::VariantNames)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BlacklistAction {
    InitialData(Vec<BlacklistedIp>),
    RegisterIp(BlacklistedIp),
    UnregisterIp(u64),
}

impl From<BlacklistAction> for Action<BlacklistedIp> {
    fn from(action: BlacklistAction) -> Self {
        match action {
            BlacklistAction::InitialData(list) => Action::ReplaceSnapshot(list),
            BlacklistAction::RegisterIp(ip) => Action::Create(ip),
            BlacklistAction::UnregisterIp(id) => Action::Delete(id),
        }
    }
}

pub fn collection() -> Collection<BlacklistedIp> {
    Collection::new()
}

pub fn dispatch(action: BlacklistAction, state: &Collection<BlacklistedIp>) -> Collection<BlacklistedIp> {
    reconcile(action.into(), state)
}

/// Decode and apply a wire message. Unknown types are an error, not a no-op.
pub fn dispatch_json(
    raw: &str,
    state: &Collection<BlacklistedIp>,
) -> Result<Collection<BlacklistedIp>, ReconcileError> {
    let action: BlacklistAction = decode_tagged(raw, "type", BlacklistAction::VARIANTS)?;
    Ok(dispatch(action, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_ip_goes_first() {
        let state = Collection::from_records(vec![BlacklistedIp::new(1, "1.1.1.1")]);
        let next = dispatch(BlacklistAction::RegisterIp(BlacklistedIp::new(2, "2.2.2.2")), &state);

        let ips: Vec<_> = next.iter().map(|r| (r.id, r.ip.as_str())).collect();
        assert_eq!(ips, vec![(2, "2.2.2.2"), (1, "1.1.1.1")]);
    }

    #[test]
    fn test_unregister_ip_removes() {
        let state = Collection::from_records(vec![
            BlacklistedIp::new(1, "1.1.1.1"),
            BlacklistedIp::new(2, "2.2.2.2"),
            BlacklistedIp::new(3, "3.3.3.3"),
        ]);
        let next = dispatch(BlacklistAction::UnregisterIp(2), &state);

        let ids: Vec<_> = next.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_initial_data_seeds() {
        let next = dispatch(
            BlacklistAction::InitialData(vec![BlacklistedIp::new(4, "4.4.4.4")]),
            &collection(),
        );
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_dispatch_json_register() {
        let state = collection();
        let next = dispatch_json(
            r#"{"type":"REGISTER_IP","payload":{"id":9,"ip":"9.9.9.9"}}"#,
            &state,
        )
        .unwrap();
        assert_eq!(next.get(&9).map(|r| r.ip.as_str()), Some("9.9.9.9"));
    }

    #[test]
    fn test_dispatch_json_unknown_type_errors_and_keeps_state() {
        let state = Collection::from_records(vec![BlacklistedIp::new(1, "1.1.1.1")]);
        let err = dispatch_json(r#"{"type":"BOGUS"}"#, &state).unwrap_err();

        assert_eq!(err, ReconcileError::UnknownAction { kind: "BOGUS".into() });
        assert_eq!(state.len(), 1);
        assert_eq!(state.get(&1).unwrap().ip, "1.1.1.1");
    }
}
