//! Trades screen: kept sorted by `event_time` in a caller-chosen direction.

use balancer_types::{SortDirection, Trade};
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::reconcile::{Action, Collection, ReconcileError, SortSpec, decode_tagged, reconcile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::VariantNames)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TradesAction {
    InitialData(Vec<Trade>),
    CreateTrade(Trade),
    UpdateTrade(Trade),
    DeleteTrade(u64),
}

impl From<TradesAction> for Action<Trade> {
    fn from(action: TradesAction) -> Self {
        match action {
            TradesAction::InitialData(list) => Action::ReplaceSnapshot(list),
            TradesAction::CreateTrade(trade) => Action::Create(trade),
            TradesAction::UpdateTrade(trade) => Action::Update(trade),
            TradesAction::DeleteTrade(id) => Action::Delete(id),
        }
    }
}

pub fn sort_spec(direction: SortDirection) -> SortSpec<Trade> {
    SortSpec::new("event_time", direction, Trade::cmp_event_time)
}

pub fn collection(direction: SortDirection) -> Collection<Trade> {
    Collection::with_sort(sort_spec(direction))
}

pub fn dispatch(action: TradesAction, state: &Collection<Trade>) -> Collection<Trade> {
    reconcile(action.into(), state)
}

pub fn dispatch_json(raw: &str, state: &Collection<Trade>) -> Result<Collection<Trade>, ReconcileError> {
    let action: TradesAction = decode_tagged(raw, "type", TradesAction::VARIANTS)?;
    Ok(dispatch(action, state))
}
