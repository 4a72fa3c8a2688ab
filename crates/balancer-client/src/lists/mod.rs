//! Per-screen reducers for the lists the client keeps.
//!
//! Each screen speaks its own action vocabulary on the wire
//! (`{ "type": "REGISTER_IP", "payload": ... }`). The vocabularies are thin:
//! every variant maps onto one generic [`Action`](crate::reconcile::Action)
//! and the actual list rules live in [`reconcile`](crate::reconcile).

pub mod api_errors;
pub mod blacklist;
pub mod trades;

pub use api_errors::ApiErrorsAction;
pub use blacklist::BlacklistAction;
pub use trades::TradesAction;
