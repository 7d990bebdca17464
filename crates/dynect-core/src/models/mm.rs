use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{deserialize_string_or_number, from_data};
use crate::api::{DynError, Verb};
use crate::session::MmSession;

/// One email account visible to the API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmAccount {
    pub username: String,
    #[serde(default)]
    pub accountname: Option<String>,
    #[serde(default)]
    pub companyname: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub emailsent: Option<String>,
    /// Remaining account fields as returned.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Accounts list plus the sending cap they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmAccounts {
    pub accounts: Vec<MmAccount>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub emailcap: Option<String>,
}

impl MmAccounts {
    pub fn list(session: &mut MmSession) -> Result<MmAccounts, DynError> {
        let data = session.execute(Verb::Get, "/accounts", &Value::Null)?;
        from_data(data, "account list")
    }
}

/// An address allowed in the "from" field of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmSender {
    pub emailaddress: String,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub seeding: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub dkim: Option<String>,
    #[serde(default)]
    pub spf: Option<String>,
}

#[derive(Deserialize)]
struct SenderList {
    senders: Vec<MmSender>,
}

impl MmSender {
    /// One page of approved senders, starting at `start_index`.
    pub fn list(session: &mut MmSession, start_index: u32) -> Result<Vec<MmSender>, DynError> {
        let data = session.execute(Verb::Get, "/senders", &json!({"start_index": start_index}))?;
        let list: SenderList = from_data(data, "sender list")?;
        Ok(list.senders)
    }

    pub fn get(session: &mut MmSession, emailaddress: &str) -> Result<MmSender, DynError> {
        let data = session.execute(
            Verb::Get,
            "/senders/details",
            &json!({"emailaddress": emailaddress}),
        )?;
        from_data(with_address(data, emailaddress), "sender")
    }

    /// Create or update an approved sender.
    pub fn create(
        session: &mut MmSession,
        emailaddress: &str,
        seeding: bool,
    ) -> Result<MmSender, DynError> {
        let data = session.execute(
            Verb::Post,
            "/senders",
            &json!({"emailaddress": emailaddress, "seeding": seeding}),
        )?;
        from_data(with_address(data, emailaddress), "sender")
    }

    pub fn is_seeding(&self) -> bool {
        self.seeding.as_deref() == Some("1")
    }
}

/// Detail replies may leave out the address they describe.
fn with_address(mut data: Value, emailaddress: &str) -> Value {
    if let Value::Object(ref mut map) = data {
        map.entry("emailaddress")
            .or_insert_with(|| Value::String(emailaddress.to_string()));
    }
    data
}

impl fmt::Display for MmSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ApprovedSender>: {}", self.emailaddress)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::transport::mock::ScriptedTransport;
    use crate::api::RawResponse;
    use crate::auth::CredentialKey;
    use crate::config::SessionConfig;

    fn ok(data: Value) -> RawResponse {
        let body = json!({"response": {"status": 200, "message": "OK", "data": data}});
        RawResponse::json(200, body.to_string())
    }

    fn session(transport: &Arc<ScriptedTransport>) -> MmSession {
        MmSession::with_transport(
            CredentialKey::new("acme", "mailer"),
            "abc123",
            SessionConfig::message_management(),
            transport.clone(),
        )
        .expect("session")
    }

    #[test]
    fn test_list_accounts() {
        let transport = ScriptedTransport::new();
        transport.reply(ok(json!({
            "emailcap": 50000,
            "accounts": [
                {"username": "ops@acme.test", "accountname": "Acme", "emailsent": "12", "timezone": "-05:00"}
            ]
        })));
        let mut session = session(&transport);

        let accounts = MmAccounts::list(&mut session).expect("accounts");
        assert_eq!(accounts.emailcap.as_deref(), Some("50000"));
        assert_eq!(accounts.accounts[0].username, "ops@acme.test");
        assert_eq!(accounts.accounts[0].emailsent.as_deref(), Some("12"));
        assert_eq!(accounts.accounts[0].extra.get("timezone"), Some(&json!("-05:00")));
        assert_eq!(transport.requests()[0].path, "/rest/json/accounts?apikey=abc123");
    }

    #[test]
    fn test_senders() {
        let transport = ScriptedTransport::new();
        transport
            .reply(ok(json!({"senders": [{"emailaddress": "news@acme.test", "seeding": 0}]})))
            .reply(ok(json!({"seeding": 1, "status": "ok", "dkim": "verified"})))
            .reply(ok(json!({"emailaddress": "info@acme.test", "seeding": "1"})));
        let mut session = session(&transport);

        let senders = MmSender::list(&mut session, 25).expect("list");
        assert_eq!(senders.len(), 1);
        assert!(!senders[0].is_seeding());

        let sender = MmSender::get(&mut session, "news@acme.test").expect("get");
        assert_eq!(sender.emailaddress, "news@acme.test");
        assert!(sender.is_seeding());
        assert_eq!(sender.to_string(), "<ApprovedSender>: news@acme.test");

        let created = MmSender::create(&mut session, "info@acme.test", true).expect("create");
        assert!(created.is_seeding());

        let requests = transport.requests();
        assert_eq!(requests[0].path, "/rest/json/senders?start_index=25&apikey=abc123");
        assert_eq!(
            requests[1].path,
            "/rest/json/senders/details?emailaddress=news%40acme.test&apikey=abc123"
        );
        assert_eq!(requests[2].body, "emailaddress=info%40acme.test&seeding=1&apikey=abc123");
    }
}
