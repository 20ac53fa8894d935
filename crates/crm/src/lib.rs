//! REST adapter for the CRM backend.
//!
//! `RestCrmClient` talks to a Salesforce-style REST API (SOQL query endpoint
//! plus sobject create/update). `CrmCandidateSource` and `CrmRecordWriter`
//! adapt the client to the engine's capability traits: the search side
//! degrades to empty result lists on any transport failure, the write side
//! classifies converted-lead rejections so the engine can run its fallback
//! loop.

pub mod client;
pub mod source;

pub use client::{AccountRef, CrmError, RestCrmClient};
pub use source::{CrmCandidateSource, CrmRecordWriter};
