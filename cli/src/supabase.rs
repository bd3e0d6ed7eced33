use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use calori_core::models::{ActivityKind, ActivityRecord, UserProfile, WaterTotals, WeightEntry};
use calori_core::remote::{
    ActivityRow, ProfileRow, RemoteAuth, RemoteSession, RemoteStore, RemoteUser, WaterRow,
    WeightRow, water_rows_to_totals,
};

const WATER_TABLE: &str = "water_consumption";
const WEIGHT_TABLE: &str = "weight_tracking";
const USERS_TABLE: &str = "users";
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";

/// Supabase REST (`PostgREST`) and auth (`GoTrue`) client.
///
/// Requests carry the signed-in user's access token once one is known, and
/// the anon key otherwise.
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

/// Token grant response. Sign-up leaves the tokens out when email
/// confirmation is required.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<RemoteUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("calori-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: RwLock::new(None),
        })
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn bearer(&self) -> String {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_as(method, path, &self.bearer())
    }

    fn request_as(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<T>> {
        let resp = self
            .table(Method::GET, table)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "date.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to reach Supabase ({table})"))?;
        let rows = checked(resp, table)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {table} rows"))?;
        Ok(rows)
    }

    /// Upsert rows unique on `(user_id, date)`.
    async fn upsert_by_date<T: serde::Serialize + Sync>(&self, table: &str, row: &T) -> Result<()> {
        let resp = self
            .table(Method::POST, table)
            .query(&[("on_conflict", "user_id,date")])
            .header("Prefer", UPSERT_PREFER)
            .json(row)
            .send()
            .await
            .with_context(|| format!("Failed to reach Supabase ({table})"))?;
        checked(resp, table).await?;
        Ok(())
    }

    async fn grant(&self, path: &str, body: serde_json::Value, what: &str) -> Result<RemoteSession> {
        let resp = self
            .request(Method::POST, path)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Supabase auth ({what})"))?;
        let auth: AuthResponse = checked(resp, what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))?;

        let (Some(access_token), Some(user)) = (auth.access_token, auth.user) else {
            bail!("No session returned. Confirm your email address, then log in");
        };
        self.set_access_token(Some(access_token.clone()));
        debug!(user_id = %user.id, what, "session established");
        Ok(RemoteSession {
            access_token,
            refresh_token: auth.refresh_token,
            expires_at: auth.expires_at,
            user,
        })
    }
}

/// Pass successful responses through; turn anything else into an error with
/// the server's message.
async fn checked(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|e| e.error_description.or(e.msg).or(e.message))
        .unwrap_or(body);
    bail!("{what} failed (HTTP {}): {message}", status.as_u16())
}

#[async_trait]
impl RemoteStore for SupabaseClient {
    async fn fetch_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>> {
        let rows: Vec<ActivityRow> = self.fetch_rows(kind.table(), user_id, limit).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_record(kind))
            .collect())
    }

    async fn insert_activity(&self, user_id: &str, record: &ActivityRecord) -> Result<()> {
        let table = record.kind().table();
        let resp = self
            .table(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(&ActivityRow::from_record(user_id, record))
            .send()
            .await
            .with_context(|| format!("Failed to reach Supabase ({table})"))?;
        checked(resp, table).await?;
        Ok(())
    }

    async fn fetch_water(&self, user_id: &str, limit: usize) -> Result<WaterTotals> {
        let rows: Vec<WaterRow> = self.fetch_rows(WATER_TABLE, user_id, limit).await?;
        Ok(water_rows_to_totals(rows))
    }

    async fn upsert_water(&self, user_id: &str, date: NaiveDate, total_liters: f64) -> Result<()> {
        let row = WaterRow {
            user_id: Some(user_id.to_string()),
            date: date.format("%Y-%m-%d").to_string(),
            amount: total_liters,
        };
        self.upsert_by_date(WATER_TABLE, &row).await
    }

    async fn fetch_weight(&self, user_id: &str, limit: usize) -> Result<Vec<WeightEntry>> {
        let rows: Vec<WeightRow> = self.fetch_rows(WEIGHT_TABLE, user_id, limit).await?;
        Ok(rows.into_iter().filter_map(WeightRow::into_entry).collect())
    }

    async fn upsert_weight(&self, user_id: &str, entry: &WeightEntry) -> Result<()> {
        self.upsert_by_date(WEIGHT_TABLE, &WeightRow::from_entry(user_id, entry))
            .await
    }

    async fn delete_weight(&self, user_id: &str, date: NaiveDate) -> Result<()> {
        let resp = self
            .table(Method::DELETE, WEIGHT_TABLE)
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("date", format!("eq.{}", date.format("%Y-%m-%d"))),
            ])
            .send()
            .await
            .context("Failed to reach Supabase (weight_tracking)")?;
        checked(resp, WEIGHT_TABLE).await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let resp = self
            .table(Method::GET, USERS_TABLE)
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .context("Failed to reach Supabase (users)")?;
        let rows: Vec<ProfileRow> = checked(resp, USERS_TABLE)
            .await?
            .json()
            .await
            .context("Failed to parse users row")?;
        Ok(rows.into_iter().next().map(ProfileRow::into_profile))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let resp = self
            .table(Method::POST, USERS_TABLE)
            .query(&[("on_conflict", "id")])
            .header("Prefer", UPSERT_PREFER)
            .json(&ProfileRow::from_profile(profile))
            .send()
            .await
            .context("Failed to reach Supabase (users)")?;
        checked(resp, USERS_TABLE).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteAuth for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<RemoteSession> {
        self.grant(
            "/auth/v1/signup",
            serde_json::json!({ "email": email, "password": password }),
            "sign-up",
        )
        .await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<RemoteSession> {
        self.grant(
            "/auth/v1/token?grant_type=password",
            serde_json::json!({ "email": email, "password": password }),
            "sign-in",
        )
        .await
    }

    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<RemoteSession> {
        self.grant(
            "/auth/v1/token?grant_type=id_token",
            serde_json::json!({ "provider": provider, "id_token": id_token }),
            "identity sign-in",
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<RemoteUser> {
        let resp = self
            .request_as(Method::GET, "/auth/v1/user", access_token)
            .send()
            .await
            .context("Failed to reach Supabase auth")?;
        checked(resp, "session check")
            .await?
            .json()
            .await
            .context("Failed to parse user response")
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let resp = self
            .request_as(Method::POST, "/auth/v1/logout", access_token)
            .send()
            .await
            .context("Failed to reach Supabase auth")?;
        self.set_access_token(None);
        checked(resp, "sign-out").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calori_core::models::ActivityDetail;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client() -> (MockServer, SupabaseClient) {
        let server = MockServer::start().await;
        let client = SupabaseClient::new(&server.uri(), "anon").unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_fetch_steps() {
        let (server, client) = client().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/steps_activity"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("order", "date.desc"))
            .and(query_param("limit", "100"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": "u1", "date": "2024-05-01T08:00:00+00:00", "steps": 5000, "created_at": "2024-05-01T08:00:01+00:00"},
                {"user_id": "u1", "steps": 100},
            ])))
            .mount(&server)
            .await;

        let records = client
            .fetch_activity("u1", ActivityKind::Steps, 100)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detail, ActivityDetail::Steps { steps: 5000 });
        assert_eq!(
            records[0].date,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_upsert_water_sends_total() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/water_consumption"))
            .and(query_param("on_conflict", "user_id,date"))
            .and(header("Prefer", "resolution=merge-duplicates"))
            .and(header("Prefer", "return=minimal"))
            .and(body_partial_json(json!({"user_id": "u1", "date": "2024-05-01", "amount": 1.25})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client
            .upsert_water("u1", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 1.25)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_message_is_surfaced() {
        let (server, client) = client().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/weight_tracking"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})),
            )
            .mount(&server)
            .await;

        let err = client
            .delete_weight("u1", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("JWT expired"));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_sign_in_uses_token_afterwards() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "refresh_token": "ref",
                "expires_at": 1_700_000_000,
                "user": {"id": "u9", "email": "a@b.co"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u9"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "u9",
                "email": "a@b.co",
                "nama_lengkap": "Ani",
                "jenis_kelamin": "perempuan",
                "goal": "turun",
                "has_completed_data": true
            }])))
            .mount(&server)
            .await;

        let session = client.sign_in_with_password("a@b.co", "pw").await.unwrap();
        assert_eq!(session.user.id, "u9");
        assert_eq!(session.refresh_token.as_deref(), Some("ref"));

        let profile = client.fetch_profile("u9").await.unwrap().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Ani"));
        assert!(profile.profile_completed);
    }

    #[tokio::test]
    async fn test_sign_up_without_session() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "u1", "email": "a@b.co"})),
            )
            .mount(&server)
            .await;
        let err = client.sign_up("a@b.co", "secret1").await.unwrap_err();
        assert!(err.to_string().contains("Confirm your email"));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;
        let err = client
            .sign_in_with_password("a@b.co", "nope")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid login credentials"));
    }

    #[tokio::test]
    async fn test_missing_profile_is_none() {
        let (server, client) = client().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        assert!(client.fetch_profile("nobody").await.unwrap().is_none());
    }
}
