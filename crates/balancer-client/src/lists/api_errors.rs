//! API error log: newest first, paginated with "load more".

use balancer_types::ApiErrorRecord;
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::reconcile::{Action, Collection, ReconcileError, decode_tagged, reconcile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::VariantNames)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorsAction {
    InitialData(Vec<ApiErrorRecord>),
    LoadMore(Vec<ApiErrorRecord>),
    DeleteError(u64),
}

impl From<ApiErrorsAction> for Action<ApiErrorRecord> {
    fn from(action: ApiErrorsAction) -> Self {
        match action {
            ApiErrorsAction::InitialData(list) => Action::ReplaceSnapshot(list),
            ApiErrorsAction::LoadMore(page) => Action::AppendPage(page),
            ApiErrorsAction::DeleteError(id) => Action::Delete(id),
        }
    }
}

pub fn collection() -> Collection<ApiErrorRecord> {
    Collection::new()
}

pub fn dispatch(action: ApiErrorsAction, state: &Collection<ApiErrorRecord>) -> Collection<ApiErrorRecord> {
    reconcile(action.into(), state)
}

pub fn dispatch_json(
    raw: &str,
    state: &Collection<ApiErrorRecord>,
) -> Result<Collection<ApiErrorRecord>, ReconcileError> {
    let action: ApiErrorsAction = decode_tagged(raw, "type", ApiErrorsAction::VARIANTS)?;
    Ok(dispatch(action, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64) -> ApiErrorRecord {
        ApiErrorRecord {
            id,
            origin: "strategy.plan".into(),
            error: "Exchange unavailable".into(),
            uid: None,
            created_at: id * 1_000,
        }
    }

    #[test]
    fn test_load_more_appends_older_records() {
        let state = dispatch(ApiErrorsAction::InitialData(vec![record(9), record(8)]), &collection());
        let next = dispatch(ApiErrorsAction::LoadMore(vec![record(7), record(6)]), &state);
        assert_eq!(next.iter().map(|r| r.id).collect::<Vec<_>>(), vec![9, 8, 7, 6]);
        assert_eq!(next.last_key(), Some(6));
    }

    #[test]
    fn test_delete_error() {
        let state = dispatch(ApiErrorsAction::InitialData(vec![record(2), record(1)]), &collection());
        let next = dispatch_json(r#"{"type":"DELETE_ERROR","payload":2}"#, &state).unwrap();
        assert_eq!(next.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_unknown_type() {
        let err = dispatch_json(r#"{"type":"REFRESH_ALL","payload":null}"#, &collection()).unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownAction { .. }));
    }
}
