use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use rand::{distributions::Alphanumeric, Rng as _};
use serde_json::Value;
use tokio::sync::{watch, Notify};

use super::{
    AuthErrorCode, AuthService, AuthSubscription, BackendError, Direction, FeedbackStore, Session,
    StoredDocument, User,
};

/// Consecutive failed sign-ins after which an account is locked out.
pub const MAX_FAILED_SIGN_INS: u32 = 5;

const DOCUMENT_ID_LEN: usize = 20;

/// An in-process stand-in for the hosted backend. Clones share the same
/// state, so a test can keep one handle to inspect what the flows did with
/// another.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Rc<RefCell<MemoryState>>,
    auth_state: Rc<watch::Sender<Option<User>>>,
}

#[derive(Default)]
struct MemoryState {
    /// Documents of each collection, in creation order.
    collections: HashMap<String, Vec<StoredDocument>>,
    accounts: HashMap<String, Account>,
    /// Tokens handed out by sign-ins that have not been revoked yet.
    live_tokens: HashSet<String>,
    next_token: u64,
    faults: Faults,
    counters: CallCounters,
    /// While set, queries wait on this before answering.
    query_gate: Option<Rc<Notify>>,
}

struct Account {
    uid: String,
    password: String,
    disabled: bool,
    failed_attempts: u32,
}

/// Errors to return from the next call of each kind instead of doing the work.
#[derive(Default)]
struct Faults {
    sign_in: Option<BackendError>,
    sign_out: Option<BackendError>,
    write: Option<BackendError>,
    query: Option<BackendError>,
}

/// How many times each operation reached the backend, including failed ones.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct CallCounters {
    pub sign_ins: usize,
    pub sign_outs: usize,
    pub writes: usize,
    pub queries: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { state: Rc::new(RefCell::new(MemoryState::default())), auth_state: Rc::new(sender) }
    }

    /// Registers an account that can sign in, returning its uid.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let uid = random_id();
        let account = Account {
            uid: uid.clone(),
            password: password.to_string(),
            disabled: false,
            failed_attempts: 0,
        };
        self.state.borrow_mut().accounts.insert(email.to_string(), account);
        uid
    }

    pub fn disable_account(&self, email: &str) {
        if let Some(account) = self.state.borrow_mut().accounts.get_mut(email) {
            account.disabled = true;
        }
    }

    /// Stores a document directly, bypassing any checks. Returns its id.
    pub fn insert_document(&self, collection: &str, data: Value) -> String {
        let id = random_id();
        self.state
            .borrow_mut()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument { id: id.clone(), data });
        id
    }

    /// All documents of a collection in creation order.
    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.state.borrow().collections.get(collection).cloned().unwrap_or_default()
    }

    /// Revokes every session and pushes a signed-out event, as when the
    /// backend expires a login on its own.
    pub fn expire_sessions(&self) {
        self.state.borrow_mut().live_tokens.clear();
        self.auth_state.send_replace(None);
    }

    pub fn fail_next_sign_in(&self, error: BackendError) {
        self.state.borrow_mut().faults.sign_in = Some(error);
    }

    pub fn fail_next_sign_out(&self, error: BackendError) {
        self.state.borrow_mut().faults.sign_out = Some(error);
    }

    pub fn fail_next_write(&self, error: BackendError) {
        self.state.borrow_mut().faults.write = Some(error);
    }

    pub fn fail_next_query(&self, error: BackendError) {
        self.state.borrow_mut().faults.query = Some(error);
    }

    /// Makes queries wait until `release_queries` is called.
    pub fn hold_queries(&self) {
        self.state.borrow_mut().query_gate = Some(Rc::new(Notify::new()));
    }

    pub fn release_queries(&self) {
        if let Some(gate) = self.state.borrow_mut().query_gate.take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn counters(&self) -> CallCounters {
        self.state.borrow().counters
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackStore for MemoryBackend {
    async fn create_document(&self, collection: &str, data: Value) -> Result<String, BackendError> {
        {
            let mut state = self.state.borrow_mut();
            state.counters.writes += 1;
            if let Some(error) = state.faults.write.take() {
                return Err(error);
            }
        }
        if !data.is_object() {
            return Err(BackendError::Malformed("a document must be a JSON object".to_string()));
        }
        Ok(self.insert_document(collection, data))
    }

    async fn query_ordered(
        &self,
        session: &Session,
        collection: &str,
        order_by: &str,
        direction: Direction,
    ) -> Result<Vec<StoredDocument>, BackendError> {
        let gate = {
            let mut state = self.state.borrow_mut();
            state.counters.queries += 1;
            state.query_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.borrow_mut();
        if let Some(error) = state.faults.query.take() {
            return Err(error);
        }
        let authorized = session.id_token().is_some_and(|token| state.live_tokens.contains(token));
        if !authorized {
            return Err(BackendError::PermissionDenied(format!(
                "reading `{collection}` requires a signed-in user"
            )));
        }

        // like the hosted store, documents without the ordering field are
        // left out of ordered queries
        let mut documents: Vec<StoredDocument> = state
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| order_key(document, order_by).is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // the sort is stable, so equal keys keep creation order
        documents.sort_by(|a, b| {
            let ordering = compare_values(order_key(a, order_by), order_key(b, order_by));
            match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
        Ok(documents)
    }
}

impl AuthService for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let mut state = self.state.borrow_mut();
        state.counters.sign_ins += 1;
        if let Some(error) = state.faults.sign_in.take() {
            return Err(error);
        }

        let Some(account) = state.accounts.get_mut(email) else {
            return Err(BackendError::Auth(AuthErrorCode::InvalidCredential));
        };
        if account.disabled {
            return Err(BackendError::Auth(AuthErrorCode::UserDisabled));
        }
        if account.failed_attempts >= MAX_FAILED_SIGN_INS {
            return Err(BackendError::Auth(AuthErrorCode::TooManyRequests));
        }
        if account.password != password {
            account.failed_attempts += 1;
            return Err(BackendError::Auth(AuthErrorCode::InvalidCredential));
        }
        account.failed_attempts = 0;
        let uid = account.uid.clone();

        state.next_token += 1;
        let id_token = format!("memory-token-{}", state.next_token);
        state.live_tokens.insert(id_token.clone());
        let user = User { uid, email: email.to_string(), id_token };
        drop(state);

        self.auth_state.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.counters.sign_outs += 1;
        if let Some(error) = state.faults.sign_out.take() {
            return Err(error);
        }
        if let Some(user) = self.auth_state.borrow().as_ref() {
            state.live_tokens.remove(&user.id_token);
        }
        drop(state);

        self.auth_state.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.auth_state.subscribe())
    }
}

fn order_key<'a>(document: &'a StoredDocument, field: &str) -> Option<&'a Value> {
    document.data.get(field).filter(|value| !value.is_null())
}

// orders values of the same kind naturally; mixed kinds order by kind, like
// the hosted store does
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => rank(a).cmp(&rank(b)),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// An id in the style of the hosted store's auto-generated ids.
fn random_id() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(DOCUMENT_ID_LEN).map(char::from).collect()
}
