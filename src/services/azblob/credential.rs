// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::Request;
use http::StatusCode;
use serde::Deserialize;

use crate::raw::*;
use crate::*;

/// Management-plane endpoint used for the refresh-token key discovery.
const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
/// Storage-plane resource requested for service-principal tokens.
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
/// OAuth authority.
const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
/// Client id of the Azure CLI, usable with CLI-issued refresh tokens.
const AZURE_CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
/// Management API version for subscription and key enumeration.
const MANAGEMENT_API_VERSION: &str = "2019-04-01";

/// Storage account keys are long lived; rotate the cached entry daily.
const SHARED_KEY_EXPIRATION_SECONDS: f64 = 24.0 * 60.0 * 60.0;
/// Signed URLs cannot outlive the token that minted the delegation key, so
/// keys are kept for an hour only.
pub const SAS_KEY_EXPIRATION_SECONDS: f64 = 60.0 * 60.0;

/// An Azure credential-bearing token.
#[derive(Clone, Debug)]
pub enum AzureToken {
    /// A base64 storage-account key, used for shared-key request signing.
    SharedKey(String),
    /// A bearer token for the storage plane.
    Oauth(String),
}

/// Credentials discovered from the environment.
///
/// `AZURE_APPLICATION_CREDENTIALS` points at a JSON file; the individual
/// environment variables override its fields.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureCredentials {
    pub storage_account_key: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
}

pub fn load_credentials() -> Result<AzureCredentials> {
    let mut creds = match std::env::var("AZURE_APPLICATION_CREDENTIALS") {
        Ok(path) => {
            let content = std::fs::read(&path)
                .map_err(|err| new_std_io_error(err).with_operation("azblob::load_credentials"))?;
            serde_json::from_slice(&content).map_err(|err| {
                Error::new(ErrorKind::ConfigInvalid, "parsing azure credentials file")
                    .with_context("path", path)
                    .with_source(err)
            })?
        }
        Err(_) => AzureCredentials::default(),
    };

    if let Ok(v) = std::env::var("AZURE_STORAGE_KEY") {
        creds.storage_account_key = Some(v);
    }
    if let Ok(v) = std::env::var("AZURE_CLIENT_ID") {
        creds.client_id = Some(v);
    }
    if let Ok(v) = std::env::var("AZURE_CLIENT_SECRET") {
        creds.client_secret = Some(v);
    }
    if let Ok(v) = std::env::var("AZURE_TENANT_ID") {
        creds.tenant_id = Some(v);
    }
    Ok(creds)
}

#[derive(Debug, Deserialize)]
struct OauthTokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    expires_in: Option<f64>,
}

/// `expires_in` arrives as a number from some endpoints and a string from
/// others.
fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        None => None,
        Some(NumberOrString::Number(v)) => Some(v),
        Some(NumberOrString::String(v)) => v.parse().ok(),
    })
}

#[derive(Debug, Deserialize)]
struct SubscriptionsResponse {
    value: Vec<Subscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct StorageAccountsResponse {
    value: Vec<StorageAccount>,
}

#[derive(Debug, Deserialize)]
struct StorageAccount {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    keys: Vec<StorageAccountKey>,
}

#[derive(Debug, Deserialize)]
struct StorageAccountKey {
    value: String,
    permissions: String,
}

/// Loads storage-access tokens for one account, trying in order:
///
/// 1. a storage account key,
/// 2. a refresh token, exchanged on the management plane to enumerate
///    subscriptions and their storage accounts and list the account's keys,
/// 3. a service principal, exchanged for a storage-plane bearer token.
pub struct AzureTokenLoader {
    client: HttpClient,
}

impl AzureTokenLoader {
    pub fn new(client: HttpClient) -> Self {
        AzureTokenLoader { client }
    }

    async fn oauth_grant(&self, tenant: &str, form: String) -> Result<OauthTokenResponse> {
        let url = format!("{LOGIN_ENDPOINT}/{tenant}/oauth2/token");
        let resp = self
            .client
            .execute(|| async {
                Request::post(&url)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Bytes::from(form.clone()))
                    .map_err(new_request_build_error)
            })
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(super::error::parse_error(resp)
                .await
                .with_operation("azblob::oauth_grant"));
        }
        let bs = read_body(resp).await?;
        serde_json::from_slice(&bs).map_err(new_json_deserialize_error)
    }

    async fn management_get<T: serde::de::DeserializeOwned>(
        &self,
        bearer: &str,
        url: String,
        method: http::Method,
    ) -> Result<T> {
        let resp = self
            .client
            .execute(|| async {
                Request::builder()
                    .method(method.clone())
                    .uri(&url)
                    .header(http::header::AUTHORIZATION, format!("Bearer {bearer}"))
                    .header(http::header::CONTENT_LENGTH, 0)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(super::error::parse_error(resp)
                .await
                .with_operation("azblob::management_api"));
        }
        let bs = read_body(resp).await?;
        serde_json::from_slice(&bs).map_err(new_json_deserialize_error)
    }

    /// The refresh-token dance: management token, then subscriptions, then
    /// storage accounts, then the account's keys.
    async fn shared_key_via_refresh_token(
        &self,
        refresh_token: &str,
        creds: &AzureCredentials,
        account: &str,
    ) -> Result<String> {
        let client_id = creds.client_id.as_deref().unwrap_or(AZURE_CLI_CLIENT_ID);
        let form = format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}&resource={}",
            percent_encode_component(refresh_token),
            percent_encode_component(client_id),
            percent_encode_component(&format!("{MANAGEMENT_ENDPOINT}/")),
        );
        let token = self.oauth_grant("common", form).await?;
        let bearer = token.access_token;

        let subscriptions: SubscriptionsResponse = self
            .management_get(
                &bearer,
                format!("{MANAGEMENT_ENDPOINT}/subscriptions?api-version={MANAGEMENT_API_VERSION}"),
                http::Method::GET,
            )
            .await?;

        for subscription in subscriptions.value {
            let accounts: StorageAccountsResponse = self
                .management_get(
                    &bearer,
                    format!(
                        "{MANAGEMENT_ENDPOINT}/subscriptions/{}/providers/Microsoft.Storage/storageAccounts?api-version={MANAGEMENT_API_VERSION}",
                        subscription.subscription_id
                    ),
                    http::Method::GET,
                )
                .await?;

            let Some(found) = accounts.value.into_iter().find(|v| v.name == account) else {
                continue;
            };

            let keys: ListKeysResponse = self
                .management_get(
                    &bearer,
                    format!(
                        "{MANAGEMENT_ENDPOINT}{}/listKeys?api-version={MANAGEMENT_API_VERSION}",
                        found.id
                    ),
                    http::Method::POST,
                )
                .await?;

            return keys
                .keys
                .into_iter()
                .find(|k| k.permissions.eq_ignore_ascii_case("full"))
                .map(|k| k.value)
                .ok_or_else(|| {
                    Error::new(ErrorKind::PermissionDenied, "storage account has no full-permission key")
                        .with_context("account", account)
                });
        }

        Err(Error::new(
            ErrorKind::ConfigInvalid,
            "storage account not found in any subscription",
        )
        .with_context("account", account))
    }
}

#[async_trait::async_trait]
impl TokenLoad for AzureTokenLoader {
    type Token = AzureToken;

    async fn load(&self, account: &str) -> Result<(AzureToken, f64)> {
        let now = now_epoch();
        let creds = load_credentials()?;

        if let Some(key) = &creds.storage_account_key {
            return Ok((
                AzureToken::SharedKey(key.clone()),
                now + SHARED_KEY_EXPIRATION_SECONDS,
            ));
        }

        if let Some(refresh_token) = creds.refresh_token.clone() {
            let key = self
                .shared_key_via_refresh_token(&refresh_token, &creds, account)
                .await?;
            return Ok((
                AzureToken::SharedKey(key),
                now + SHARED_KEY_EXPIRATION_SECONDS,
            ));
        }

        if let (Some(client_id), Some(client_secret), Some(tenant_id)) =
            (&creds.client_id, &creds.client_secret, &creds.tenant_id)
        {
            let form = format!(
                "grant_type=client_credentials&client_id={}&client_secret={}&resource={}",
                percent_encode_component(client_id),
                percent_encode_component(client_secret),
                percent_encode_component(STORAGE_RESOURCE),
            );
            let token = self.oauth_grant(tenant_id, form).await?;
            let lifetime = token.expires_in.unwrap_or(3600.0);
            return Ok((AzureToken::Oauth(token.access_token), now + lifetime));
        }

        Err(Error::new(ErrorKind::ConfigInvalid, "no azure credentials found")
            .with_context("account", account)
            .with_operation("azblob::load_token"))
    }
}

/// A user-delegation signing key, as returned by the service.
#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UserDelegationKey {
    pub signed_oid: String,
    pub signed_tid: String,
    pub signed_start: String,
    pub signed_expiry: String,
    pub signed_service: String,
    pub signed_version: String,
    pub value: String,
}

/// Fetches user-delegation keys; requires an OAuth storage token.
pub struct DelegationKeyLoader {
    client: HttpClient,
    tokens: Arc<TokenManager<AzureTokenLoader>>,
}

impl DelegationKeyLoader {
    pub fn new(client: HttpClient, tokens: Arc<TokenManager<AzureTokenLoader>>) -> Self {
        DelegationKeyLoader { client, tokens }
    }
}

#[async_trait::async_trait]
impl TokenLoad for DelegationKeyLoader {
    type Token = UserDelegationKey;

    async fn load(&self, account: &str) -> Result<(UserDelegationKey, f64)> {
        let now = now_epoch();
        let bearer = match self.tokens.get(account).await? {
            AzureToken::Oauth(v) => v,
            AzureToken::SharedKey(_) => {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    "user delegation keys require an oauth token, not a shared key",
                )
                .with_context("account", account))
            }
        };

        let start = chrono::Utc::now();
        let expiry = start + chrono::Duration::seconds(SAS_KEY_EXPIRATION_SECONDS as i64);
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>",
            start.format("%Y-%m-%dT%H:%M:%SZ"),
            expiry.format("%Y-%m-%dT%H:%M:%SZ"),
        );

        let url = format!(
            "https://{account}.blob.core.windows.net/?restype=service&comp=userdelegationkey"
        );
        let resp = self
            .client
            .execute(|| async {
                Request::post(&url)
                    .header(http::header::AUTHORIZATION, format!("Bearer {bearer}"))
                    .header("x-ms-version", super::core::STORAGE_VERSION)
                    .header(CONTENT_TYPE, "application/xml")
                    .header(http::header::CONTENT_LENGTH, body.len())
                    .body(Bytes::from(body.clone()))
                    .map_err(new_request_build_error)
            })
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(super::error::parse_error(resp)
                .await
                .with_operation("azblob::user_delegation_key"));
        }
        let bs = read_body(resp).await?;
        let key: UserDelegationKey =
            quick_xml::de::from_reader(bs.as_ref()).map_err(new_xml_deserialize_error)?;
        Ok((key, now + SAS_KEY_EXPIRATION_SECONDS))
    }
}

pub(super) async fn read_body(resp: reqwest::Response) -> Result<Bytes> {
    resp.bytes().await.map_err(|err| {
        Error::new(ErrorKind::Unexpected, "reading response body")
            .with_source(err)
            .set_temporary()
    })
}
