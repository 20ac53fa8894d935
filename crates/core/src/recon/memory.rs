//! In-memory backend doubles for tests, simulation runs, and local tooling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::candidate::{Candidate, RecordId};
use crate::domain::decision::FieldMap;
use crate::phone::NormalizedPhone;
use crate::recon::backend::{CandidateSource, NotePayload, RecordWriter, WriteError};

/// Candidate source returning fixed lists, with call counters so tests can
/// assert which search passes actually ran.
#[derive(Debug, Default)]
pub struct StaticCandidateSource {
    by_name: Vec<Candidate>,
    by_phone: Vec<Candidate>,
    name_searches: AtomicUsize,
    phone_searches: AtomicUsize,
}

impl StaticCandidateSource {
    pub fn new(by_name: Vec<Candidate>, by_phone: Vec<Candidate>) -> Self {
        Self {
            by_name,
            by_phone,
            name_searches: AtomicUsize::new(0),
            phone_searches: AtomicUsize::new(0),
        }
    }

    pub fn name_searches(&self) -> usize {
        self.name_searches.load(Ordering::SeqCst)
    }

    pub fn phone_searches(&self) -> usize {
        self.phone_searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn search_by_name(&self, _first: Option<&str>, _last: Option<&str>) -> Vec<Candidate> {
        self.name_searches.fetch_add(1, Ordering::SeqCst);
        self.by_name.clone()
    }

    async fn search_by_phone(&self, _phone: &NormalizedPhone) -> Vec<Candidate> {
        self.phone_searches.fetch_add(1, Ordering::SeqCst);
        self.by_phone.clone()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteCall {
    Create(FieldMap),
    Update(RecordId, FieldMap),
    AttachNote(RecordId, NotePayload),
}

/// Scripted writer that records every call. Updates succeed unless a failure
/// was registered for the target id; creates return a fixed id.
pub struct RecordingCrm {
    update_failures: HashMap<RecordId, WriteError>,
    create_result: Result<RecordId, WriteError>,
    note_result: Result<RecordId, WriteError>,
    calls: Mutex<Vec<WriteCall>>,
}

impl Default for RecordingCrm {
    fn default() -> Self {
        Self {
            update_failures: HashMap::new(),
            create_result: Ok(RecordId("NEW-1".to_string())),
            note_result: Ok(RecordId("NOTE-1".to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingCrm {
    pub fn fail_update(mut self, id: &str, error: WriteError) -> Self {
        self.update_failures.insert(RecordId(id.to_string()), error);
        self
    }

    pub fn create_returns(mut self, result: Result<RecordId, WriteError>) -> Self {
        self.create_result = result;
        self
    }

    pub fn notes_fail(mut self, error: WriteError) -> Self {
        self.note_result = Err(error);
        self
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn updates(&self) -> Vec<RecordId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WriteCall::Update(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: WriteCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

#[async_trait]
impl RecordWriter for RecordingCrm {
    async fn create_record(&self, fields: &FieldMap) -> Result<RecordId, WriteError> {
        self.record(WriteCall::Create(fields.clone()));
        self.create_result.clone()
    }

    async fn update_record(&self, id: &RecordId, fields: &FieldMap) -> Result<(), WriteError> {
        self.record(WriteCall::Update(id.clone(), fields.clone()));
        match self.update_failures.get(id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn attach_note(
        &self,
        parent: &RecordId,
        note: &NotePayload,
    ) -> Result<RecordId, WriteError> {
        self.record(WriteCall::AttachNote(parent.clone(), note.clone()));
        self.note_result.clone()
    }
}
