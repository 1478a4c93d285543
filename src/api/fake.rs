//! Scripted in-memory stand-in for the remote stats API, used by
//! executor and pipeline tests.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::{json, Value};

use super::{QueryError, RemoteSource};

pub struct FakeSource {
    documents: RefCell<HashMap<String, Value>>,
    failures: RefCell<HashMap<String, QueryError>>,
    fetched: RefCell<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            documents: RefCell::new(HashMap::new()),
            failures: RefCell::new(HashMap::new()),
            fetched: RefCell::new(Vec::new()),
        }
    }

    /// Script a raw document for a path.
    pub fn insert(&self, path: &str, document: Value) {
        self.documents.borrow_mut().insert(path.to_string(), document);
    }

    /// Script a successful response around a `Response` body.
    pub fn insert_ok(&self, path: &str, body: Value) {
        self.insert(
            path,
            json!({ "ErrorCode": 1, "ErrorStatus": "Success", "Response": body }),
        );
    }

    /// Script a business failure.
    pub fn insert_error(&self, path: &str, status: &str) {
        self.insert(path, json!({ "ErrorCode": 99, "ErrorStatus": status }));
    }

    /// Script a transport failure.
    pub fn fail(&self, path: &str, error: QueryError) {
        self.failures.borrow_mut().insert(path.to_string(), error);
    }

    /// Network calls issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetched.borrow().len()
    }
}

impl RemoteSource for FakeSource {
    async fn fetch(&self, path: &str) -> Result<Value, QueryError> {
        self.fetched.borrow_mut().push(path.to_string());

        if let Some(error) = self.failures.borrow().get(path) {
            return Err(error.clone());
        }

        self.documents
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| QueryError::Transport(format!("no scripted document for {path}")))
    }
}
