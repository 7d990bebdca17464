//! An authenticated session against the DynECT REST API.
//!
//! A [`Session`] owns one credential set, the auth token obtained for it and
//! the transport it talks through. Every API operation goes through
//! [`Session::execute`], which sends the request, reads the response
//! envelope and, while the API reports a job as incomplete, polls the job
//! until it settles or the configured deadline passes.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::registry::{ClassId, ManagedSession};
use crate::api::{
    history::{redact, CallHistory, CallOutcome},
    ApiRequest, DynError, Envelope, HttpTransport, Status, Transport, Verb,
};
use crate::auth::{CredentialKey, CredentialSet};
use crate::config::SessionConfig;

/// Every API path lives under this root
const URI_ROOT: &str = "/REST";

const SESSION_PATH: &str = "/REST/Session/";
const PERMISSION_REPORT_PATH: &str = "/REST/UserPermissionReport/";
const PASSWORD_PATH: &str = "/REST/Password/";

const CONTENT_TYPE: &str = "application/json";

/// Token and permissions returned by a successful login.
/// `permissions` is empty when the report could not be fetched.
#[derive(Clone)]
pub struct AuthInfo {
    pub token: String,
    pub permissions: Vec<String>,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("token", &"*****")
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// A job the API has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingJob {
    /// `incomplete` envelope carrying a job id
    Job(String),
    /// HTTP 307 pointing at the location to poll
    Location(String),
}

impl PendingJob {
    fn poll_path(&self) -> String {
        match self {
            PendingJob::Job(id) => format!("{}/Job/{}/", URI_ROOT, id),
            PendingJob::Location(path) => path.clone(),
        }
    }

    fn label(&self) -> &str {
        match self {
            PendingJob::Job(id) => id,
            PendingJob::Location(path) => path,
        }
    }
}

enum Reply {
    Envelope(Envelope),
    Redirect(String),
}

enum Settled {
    Done(Value),
    Pending(PendingJob),
}

pub struct Session {
    credentials: CredentialSet,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    token: Option<String>,
    permissions: Option<Vec<String>>,
    history: Option<CallHistory>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", self.credentials.key())
            .field("host", &self.config.host)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ManagedSession for Session {
    fn key(&self) -> &CredentialKey {
        Session::key(self)
    }

    fn logout(&mut self) -> Result<(), DynError> {
        Session::logout(self)
    }
}

impl Session {
    /// Registry class for Traffic Management sessions.
    pub const CLASS: ClassId = ClassId::new("dynect.tm");

    /// Create an unauthenticated session with an HTTP transport built
    /// from `config`.
    pub fn new(credentials: CredentialSet, config: SessionConfig) -> Result<Self, DynError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(credentials, config, transport))
    }

    /// Create a session and log in right away.
    pub fn open(credentials: CredentialSet, config: SessionConfig) -> Result<Self, DynError> {
        let mut session = Self::new(credentials, config)?;
        session.authenticate()?;
        Ok(session)
    }

    pub fn with_transport(
        credentials: CredentialSet,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let history = config
            .history
            .then(|| CallHistory::new(config.history_capacity));
        Self {
            credentials,
            config,
            transport,
            clock: Arc::new(SystemClock),
            token: None,
            permissions: None,
            history,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn key(&self) -> &CredentialKey {
        self.credentials.key()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Recorded calls, or `None` when history is disabled.
    pub fn history(&self) -> Option<&CallHistory> {
        self.history.as_ref()
    }

    /// Exchange the credentials for a session token and fetch the
    /// permission list of the logged-in user.
    ///
    /// An existing token is logged out first. Only the login itself can
    /// fail the call; a refused permission report leaves `permissions`
    /// empty in the returned [`AuthInfo`].
    pub fn authenticate(&mut self) -> Result<AuthInfo, DynError> {
        let args = json!({
            "customer_name": self.credentials.customer(),
            "user_name": self.credentials.username(),
            "password": self.credentials.password()?,
        });

        if self.token.is_some() {
            debug!(key = %self.key(), "Replacing existing session token");
            if let Err(e) = self.logout() {
                warn!(key = %self.key(), error = %e, "Logout of previous token failed");
            }
        }
        self.permissions = None;

        let envelope = match self.send_once(Verb::Post, SESSION_PATH, &args)? {
            Reply::Envelope(envelope) => envelope,
            Reply::Redirect(location) => {
                return Err(DynError::InvalidResponse(format!(
                    "Unexpected redirect to {} during login",
                    location
                )))
            }
        };

        if envelope.status != Status::Success {
            warn!(key = %self.key(), "Authentication rejected");
            return Err(DynError::Auth(envelope.messages()));
        }

        let token = envelope
            .data
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DynError::InvalidResponse("Login response has no token".into()))?
            .to_string();
        self.token = Some(token.clone());
        info!(key = %self.key(), host = %self.config.host, "Authentication successful");

        // The login stands even if the report is refused; permissions() retries.
        let permissions = match self.permissions() {
            Ok(permissions) => permissions.to_vec(),
            Err(e) => {
                warn!(key = %self.key(), error = %e, "Permission report unavailable");
                Vec::new()
            }
        };
        Ok(AuthInfo { token, permissions })
    }

    /// Permissions of the logged-in user, fetched once and cached.
    pub fn permissions(&mut self) -> Result<&[String], DynError> {
        if self.permissions.is_none() {
            let report = self.user_permissions_report(None)?;
            self.permissions = Some(report);
        }
        Ok(self.permissions.as_deref().unwrap_or_default())
    }

    /// Names of the permissions allowed for `user_name`, defaulting to the
    /// session's own user.
    pub fn user_permissions_report(
        &mut self,
        user_name: Option<&str>,
    ) -> Result<Vec<String>, DynError> {
        let user = user_name.unwrap_or(self.credentials.username()).to_string();
        let data = self.execute(Verb::Post, PERMISSION_REPORT_PATH, &json!({"user_name": user}))?;
        Ok(data
            .get("allowed")
            .and_then(Value::as_array)
            .map(|allowed| {
                allowed
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Change the user's password and re-seal the stored copy.
    pub fn update_password(&mut self, new_password: &str) -> Result<(), DynError> {
        self.execute(Verb::Put, PASSWORD_PATH, &json!({"password": new_password}))?;
        self.credentials.replace_password(new_password)
    }

    /// Invalidate the token on the server. The local token is dropped even
    /// when the server call fails.
    pub fn logout(&mut self) -> Result<(), DynError> {
        if self.token.is_none() {
            return Ok(());
        }
        let result = self.execute(Verb::Delete, SESSION_PATH, &json!({}));
        self.token = None;
        self.permissions = None;
        result.map(|_| ())
    }

    /// Run one API operation and return the response `data`.
    ///
    /// `failure` maps to the error kind of `verb`; `incomplete` jobs are
    /// polled every `poll_interval` until they settle, or fail with
    /// `QueryTimeout` once `max_poll_duration` would be exceeded.
    pub fn execute(&mut self, verb: Verb, path: &str, body: &Value) -> Result<Value, DynError> {
        let path = normalize_path(path);
        let reply = self.send_once(verb, &path, body)?;
        let started = self.clock.now();

        let mut job = match settle(verb, reply)? {
            Settled::Done(data) => return Ok(data),
            Settled::Pending(job) => job,
        };

        let interval = self.config.poll_interval();
        let max = self.config.max_poll_duration();
        debug!(job = job.label(), interval_ms = interval.as_millis() as u64, "Polling for job");

        loop {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed + interval > max {
                warn!(job = job.label(), elapsed_ms = elapsed.as_millis() as u64, "Job polling timed out");
                return Err(DynError::QueryTimeout {
                    job: job.label().to_string(),
                    elapsed,
                });
            }
            self.clock.sleep(interval);

            let reply = self.send_once(Verb::Get, &job.poll_path(), &json!({}))?;
            match settle(verb, reply)? {
                Settled::Done(data) => return Ok(data),
                Settled::Pending(next) => job = next,
            }
        }
    }

    /// Send a single request and read its envelope, recording the attempt
    /// in the history log.
    fn send_once(&mut self, verb: Verb, path: &str, args: &Value) -> Result<Reply, DynError> {
        let request = self.build_request(verb, path, args)?;
        debug!(verb = %verb, path = %path, args = %redact(args), "API request");

        let outcome = self
            .transport
            .send(&request)
            .and_then(|raw| {
                if raw.status == 307 {
                    if let Some(ref location) = raw.location {
                        return Ok(Reply::Redirect(location_path(location)));
                    }
                }
                Envelope::parse(raw.status, &raw.body).map(Reply::Envelope)
            });

        if let Some(ref mut history) = self.history {
            let recorded = match &outcome {
                Ok(Reply::Envelope(envelope)) => CallOutcome::from(envelope.status),
                Ok(Reply::Redirect(_)) => CallOutcome::Incomplete,
                Err(_) => CallOutcome::Error,
            };
            history.record(path, verb, args, recorded);
        }

        outcome
    }

    fn build_request(&self, verb: Verb, path: &str, args: &Value) -> Result<ApiRequest, DynError> {
        let body = serde_json::to_string(args)
            .map_err(|e| DynError::invalid_argument("body", e))?;

        let mut headers = vec![
            ("Content-Type", CONTENT_TYPE.to_string()),
            ("User-Agent", format!("dynect-rs/{}", env!("CARGO_PKG_VERSION"))),
            ("API-Version", self.config.api_version.clone()),
        ];
        if let Some(ref token) = self.token {
            headers.push(("Auth-Token", token.clone()));
        }

        Ok(ApiRequest {
            verb,
            path: path.to_string(),
            headers,
            body,
        })
    }
}

fn settle(verb: Verb, reply: Reply) -> Result<Settled, DynError> {
    let envelope = match reply {
        Reply::Envelope(envelope) => envelope,
        Reply::Redirect(location) => return Ok(Settled::Pending(PendingJob::Location(location))),
    };

    match envelope.status {
        Status::Success => Ok(Settled::Done(envelope.data)),
        Status::Failure => Err(verb_error(verb, envelope)),
        Status::Incomplete => envelope
            .job_id()
            .map(|id| Settled::Pending(PendingJob::Job(id)))
            .ok_or_else(|| DynError::InvalidResponse("Incomplete response without a job id".into())),
    }
}

/// Expired tokens also land here; `DynError::needs_reauth` tells them apart.
fn verb_error(verb: Verb, envelope: Envelope) -> DynError {
    let messages = envelope.messages();
    match verb {
        Verb::Post => DynError::Create(messages),
        Verb::Get => DynError::Get(messages),
        Verb::Put => DynError::Update(messages),
        Verb::Delete => DynError::Delete(messages),
    }
}

/// Prefix `path` with `/` and the `/REST` root where missing.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    if path == URI_ROOT || path.starts_with("/REST/") {
        path
    } else {
        format!("{}{}", URI_ROOT, path)
    }
}

/// Path and query of a `Location` header, which may be an absolute URL.
fn location_path(location: &str) -> String {
    match location.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(idx) => rest[idx..].to_string(),
            None => "/".to_string(),
        },
        None => normalize_path(location),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::history::CallOutcome;
    use crate::api::transport::mock::ScriptedTransport;
    use crate::api::RawResponse;
    use crate::session::clock::manual::ManualClock;

    fn test_config(history: bool) -> SessionConfig {
        SessionConfig {
            history,
            poll_interval_ms: 1000,
            max_poll_secs: 5,
            ..SessionConfig::default()
        }
    }

    fn session_with(
        transport: &Arc<ScriptedTransport>,
        clock: &Arc<ManualClock>,
        history: bool,
    ) -> Session {
        let creds = CredentialSet::new("acme", "ops", "hunter2").expect("creds");
        Session::with_transport(creds, test_config(history), transport.clone())
            .with_clock(clock.clone())
    }

    fn script_login(transport: &ScriptedTransport, token: &str) {
        transport.login(token).success(json!({
            "allowed": [{"name": "ZoneGet"}, {"name": "ZoneAdd"}],
            "forbidden": []
        }));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("Zone/example.com/"), "/REST/Zone/example.com/");
        assert_eq!(normalize_path("/Zone/"), "/REST/Zone/");
        assert_eq!(normalize_path("/REST/Job/12/"), "/REST/Job/12/");
        assert_eq!(normalize_path("/RESTART/"), "/REST/RESTART/");
    }

    #[test]
    fn test_location_path() {
        assert_eq!(location_path("https://api.dynect.net/REST/Job/42/"), "/REST/Job/42/");
        assert_eq!(location_path("/REST/Job/42/"), "/REST/Job/42/");
        assert_eq!(location_path("Job/42/"), "/REST/Job/42/");
    }

    #[test]
    fn test_authenticate_sets_token_and_permissions() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        script_login(&transport, "tok-1");
        let mut session = session_with(&transport, &clock, false);

        let info = session.authenticate().expect("login");
        assert_eq!(info.token, "tok-1");
        assert_eq!(info.permissions, vec!["ZoneGet", "ZoneAdd"]);
        assert!(session.is_authenticated());
        assert!(!format!("{:?}", info).contains("tok-1"));

        let requests = transport.requests();
        assert_eq!(requests[0].path, "/REST/Session/");
        assert_eq!(requests[0].verb, Verb::Post);
        let body: Value = serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body["customer_name"], "acme");
        assert_eq!(body["user_name"], "ops");
        assert_eq!(body["password"], "hunter2");
        assert_eq!(requests[0].header("Auth-Token"), None);
        assert_eq!(requests[0].header("API-Version"), Some("current"));
        // permission report carries the new token
        assert_eq!(requests[1].header("Auth-Token"), Some("tok-1"));
    }

    #[test]
    fn test_authenticate_bad_credentials() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.failure("login: Credentials you entered did not match those in our database");
        let mut session = session_with(&transport, &clock, false);

        let err = session.authenticate().unwrap_err();
        match err {
            DynError::Auth(ref messages) => {
                assert!(messages.to_string().starts_with("login: Credentials"));
            }
            other => panic!("expected auth error, got {:?}", other),
        }
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_authenticate_connect_failure() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.fail(DynError::Connect("connection refused".into()));
        let mut session = session_with(&transport, &clock, false);

        assert!(matches!(session.authenticate(), Err(DynError::Connect(_))));
    }

    #[test]
    fn test_execute_success_returns_data_unchanged() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        let data = json!({"zone": "example.com", "serial": 7, "zone_type": "Primary"});
        transport.success(data.clone());
        let mut session = session_with(&transport, &clock, false);

        let result = session
            .execute(Verb::Get, "/Zone/example.com/", &json!({}))
            .expect("execute");
        assert_eq!(result, data);
        assert_eq!(transport.requests()[0].path, "/REST/Zone/example.com/");
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_failure_maps_to_verb_error() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport
            .failure("name: Name already exists")
            .failure("zone: No such zone")
            .failure("ttl: Value must be a number")
            .failure("record: Not in zone");
        let mut session = session_with(&transport, &clock, false);
        let args = json!({});

        assert!(matches!(session.execute(Verb::Post, "/Zone/a/", &args), Err(DynError::Create(_))));
        assert!(matches!(session.execute(Verb::Get, "/Zone/a/", &args), Err(DynError::Get(_))));
        assert!(matches!(session.execute(Verb::Put, "/Zone/a/", &args), Err(DynError::Update(_))));
        let err = session.execute(Verb::Delete, "/Zone/a/", &args).unwrap_err();
        assert!(matches!(err, DynError::Delete(_)));
        assert_eq!(err.messages().map(|m| m.to_string()).as_deref(), Some("record: Not in zone."));
    }

    #[test]
    fn test_incomplete_polls_until_success() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.incomplete(42).incomplete(42).incomplete(42).success(json!({"done": true}));
        let mut session = session_with(&transport, &clock, false);

        let data = session
            .execute(Verb::Post, "/ZoneFile/example.com/", &json!({"file": "..."}))
            .expect("job completes");
        assert_eq!(data, json!({"done": true}));

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        for poll in &requests[1..] {
            assert_eq!(poll.verb, Verb::Get);
            assert_eq!(poll.path, "/REST/Job/42/");
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);
    }

    #[test]
    fn test_poll_failure_uses_request_verb() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.incomplete(7).failure("zone: Publish failed");
        let mut session = session_with(&transport, &clock, false);

        let err = session
            .execute(Verb::Put, "/Zone/example.com/", &json!({"publish": true}))
            .unwrap_err();
        assert!(matches!(err, DynError::Update(_)));
    }

    #[test]
    fn test_incomplete_times_out_without_further_polls() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        for _ in 0..10 {
            transport.incomplete(99);
        }
        let mut session = session_with(&transport, &clock, false);

        let err = session
            .execute(Verb::Get, "/Zone/slow.example/", &json!({}))
            .unwrap_err();
        match err {
            DynError::QueryTimeout { ref job, elapsed } => {
                assert_eq!(job, "99");
                assert_eq!(elapsed, Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        // initial request plus one poll per second for five seconds
        assert_eq!(transport.request_count(), 6);
        assert_eq!(transport.remaining(), 4);
        assert!(clock.elapsed() <= Duration::from_secs(5));
    }

    #[test]
    fn test_incomplete_without_job_id_is_invalid() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.reply(RawResponse::json(200, r#"{"status": "incomplete", "data": {}, "msgs": []}"#));
        let mut session = session_with(&transport, &clock, false);

        assert!(matches!(
            session.execute(Verb::Get, "/Zone/", &json!({})),
            Err(DynError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_redirect_is_polled_at_location() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport
            .reply(RawResponse::redirect("https://api.dynect.net/REST/Job/555/"))
            .success(json!(["example.com"]));
        let mut session = session_with(&transport, &clock, false);

        let data = session.execute(Verb::Get, "/Zone/", &json!({})).expect("redirect resolves");
        assert_eq!(data, json!(["example.com"]));
        assert_eq!(transport.requests()[1].path, "/REST/Job/555/");
    }

    #[test]
    fn test_non_json_body_is_invalid_response() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.reply(RawResponse::json(502, "<html>Bad Gateway</html>"));
        let mut session = session_with(&transport, &clock, true);

        let err = session.execute(Verb::Get, "/Zone/", &json!({})).unwrap_err();
        assert!(matches!(err, DynError::InvalidResponse(_)));
        let history = session.history().expect("history enabled");
        assert_eq!(history.last().map(|e| e.outcome), Some(CallOutcome::Error));
    }

    #[test]
    fn test_history_records_every_call_redacted() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        script_login(&transport, "tok-h");
        let mut session = session_with(&transport, &clock, true);
        session.authenticate().expect("login");

        let before = session.history().map(|h| h.len()).unwrap_or_default();
        assert_eq!(before, 2);

        for _ in 0..3 {
            transport.success(json!({}));
        }
        for i in 0..3 {
            session
                .execute(Verb::Get, &format!("/Zone/z{}.example/", i), &json!({"password": "oops", "detail": "Y"}))
                .expect("execute");
        }

        let history = session.history().expect("history enabled");
        assert_eq!(history.len(), before + 3);
        for entry in history.iter() {
            assert_ne!(entry.args.get("password").and_then(Value::as_str), Some("hunter2"));
            assert_ne!(entry.args.get("password").and_then(Value::as_str), Some("oops"));
        }
        let login = history.iter().next().expect("login entry");
        assert_eq!(login.path, "/REST/Session/");
        assert_eq!(login.args["password"], "*****");
    }

    #[test]
    fn test_history_includes_polls() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.incomplete(3).success(json!({}));
        let mut session = session_with(&transport, &clock, true);

        session.execute(Verb::Post, "/Zone/a/", &json!({})).expect("execute");
        let outcomes: Vec<_> = session
            .history()
            .expect("history enabled")
            .iter()
            .map(|e| e.outcome)
            .collect();
        assert_eq!(outcomes, vec![CallOutcome::Incomplete, CallOutcome::Success]);
    }

    #[test]
    fn test_history_disabled_stays_empty() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        script_login(&transport, "tok");
        transport.success(json!({})).success(json!({}));
        let mut session = session_with(&transport, &clock, false);
        session.authenticate().expect("login");
        session.execute(Verb::Get, "/Zone/", &json!({})).expect("execute");
        session.execute(Verb::Get, "/Zone/", &json!({})).expect("execute");

        assert!(session.history().map_or(true, |h| h.is_empty()));
    }

    #[test]
    fn test_logout_clears_token_even_on_failure() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        script_login(&transport, "tok-x");
        transport.fail(DynError::Connect("reset by peer".into()));
        let mut session = session_with(&transport, &clock, false);
        session.authenticate().expect("login");

        assert!(session.logout().is_err());
        assert!(!session.is_authenticated());
        // nothing left to invalidate
        assert!(session.logout().is_ok());
        assert_eq!(transport.request_count(), 3);
    }

    #[test]
    fn test_update_password_reseals() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.success(json!({}));
        script_login(&transport, "tok-2");
        let mut session = session_with(&transport, &clock, false);

        session.update_password("n3w-pass").expect("update");
        let put: Value = serde_json::from_str(&transport.requests()[0].body).expect("json body");
        assert_eq!(put["password"], "n3w-pass");

        session.authenticate().expect("login");
        let login: Value = serde_json::from_str(&transport.requests()[1].body).expect("json body");
        assert_eq!(login["password"], "n3w-pass");
    }

    #[test]
    fn test_permissions_are_cached() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        script_login(&transport, "tok");
        let mut session = session_with(&transport, &clock, false);
        session.authenticate().expect("login");

        let count = transport.request_count();
        assert_eq!(session.permissions().expect("cached").len(), 2);
        assert_eq!(transport.request_count(), count);
    }

    #[test]
    fn test_refused_permission_report_keeps_login() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport
            .login("tok-r")
            .failure("user_name: Permission denied for report")
            .success(json!({"allowed": [{"name": "ZoneGet"}]}));
        let mut session = session_with(&transport, &clock, false);

        let info = session.authenticate().expect("login stands");
        assert_eq!(info.token, "tok-r");
        assert!(info.permissions.is_empty());
        assert_eq!(session.token(), Some("tok-r"));

        // fetched again on demand
        assert_eq!(session.permissions().expect("report"), ["ZoneGet".to_string()]);
        assert_eq!(transport.request_count(), 3);
    }

    #[test]
    fn test_reauthenticate_logs_out_previous_token() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        script_login(&transport, "tok-old");
        transport.success(json!({}));
        script_login(&transport, "tok-new");
        let mut session = session_with(&transport, &clock, false);

        session.authenticate().expect("first login");
        session.authenticate().expect("second login");
        assert_eq!(session.token(), Some("tok-new"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[2].verb, Verb::Delete);
        assert_eq!(requests[2].path, "/REST/Session/");
        assert_eq!(requests[2].header("Auth-Token"), Some("tok-old"));
        assert_eq!(requests[3].header("Auth-Token"), None);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        for _ in 0..60 {
            transport.incomplete(8);
        }
        let creds = CredentialSet::new("acme", "ops", "pw").expect("creds");
        let config = SessionConfig {
            poll_interval_ms: 0,
            max_poll_secs: 5,
            ..SessionConfig::default()
        };
        let mut session = Session::with_transport(creds, config, transport.clone()).with_clock(clock.clone());

        let err = session.execute(Verb::Get, "/Zone/", &json!({})).unwrap_err();
        assert!(matches!(err, DynError::QueryTimeout { .. }));
        assert_eq!(transport.request_count(), 51);
        assert!(clock
            .sleeps()
            .iter()
            .all(|d| *d == Duration::from_millis(crate::config::MIN_POLL_INTERVAL_MS)));
    }

    #[test]
    fn test_expired_token_failure_needs_reauth() {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        transport.failure("login: Bad or expired credentials");
        let mut session = session_with(&transport, &clock, false);

        let err = session.execute(Verb::Get, "/Zone/", &json!({})).unwrap_err();
        assert!(matches!(err, DynError::Get(_)));
        assert!(err.needs_reauth());
    }
}
