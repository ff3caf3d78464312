//! GitHub and Google authorization-code flows.

use anyhow::{anyhow, Context};
use conducky_config::OAuthProviderConfig;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_API: &str = "https://api.github.com/user";
const GITHUB_EMAILS_API: &str = "https://api.github.com/user/emails";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_API: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocialProvider {
    Github,
    Google,
}

impl SocialProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialProvider::Github => "github",
            SocialProvider::Google => "google",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        match self {
            SocialProvider::Github => (GITHUB_AUTH_URL, GITHUB_TOKEN_URL),
            SocialProvider::Google => (GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL),
        }
    }

    fn scopes(&self) -> &'static [&'static str] {
        match self {
            SocialProvider::Github => &["read:user", "user:email"],
            SocialProvider::Google => &["openid", "email", "profile"],
        }
    }
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(SocialProvider::Github),
            "google" => Ok(SocialProvider::Google),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Identity returned by a provider after a successful code exchange.
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub provider: SocialProvider,
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub(crate) struct OAuthClient {
    provider: SocialProvider,
    client: BasicClient,
    http: reqwest::Client,
}

impl OAuthClient {
    pub(crate) fn from_config(
        provider: SocialProvider,
        config: &OAuthProviderConfig,
    ) -> anyhow::Result<Option<Self>> {
        let Some((client_id, client_secret)) = config.credentials() else {
            return Ok(None);
        };
        let (auth_url, token_url) = provider.endpoints();

        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(auth_url.to_string()).context("invalid authorization url")?,
            Some(TokenUrl::new(token_url.to_string()).context("invalid token url")?),
        )
        .set_auth_type(AuthType::RequestBody);

        let http = reqwest::Client::builder()
            .user_agent("conducky-backend")
            .build()
            .context("failed to build oauth http client")?;

        Ok(Some(Self {
            provider,
            client,
            http,
        }))
    }

    pub(crate) fn authorize_url(&self, state: &str, redirect_uri: &str) -> anyhow::Result<String> {
        let redirect = RedirectUrl::new(redirect_uri.to_owned())
            .with_context(|| format!("invalid redirect uri for {} oauth", self.provider))?;

        let client = self.client.clone().set_redirect_uri(redirect);
        let mut request = client.authorize_url(|| CsrfToken::new(state.to_owned()));
        for scope in self.provider.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }

    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<SocialProfile> {
        let redirect = RedirectUrl::new(redirect_uri.to_owned())
            .with_context(|| format!("invalid redirect uri for {} oauth", self.provider))?;

        let client = self.client.clone().set_redirect_uri(redirect);
        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .request_async(async_http_client)
            .await
            .with_context(|| format!("failed to exchange {} oauth code", self.provider))?;

        let access_token = token_response.access_token().secret();

        match self.provider {
            SocialProvider::Github => self.github_profile(access_token).await,
            SocialProvider::Google => self.google_profile(access_token).await,
        }
    }

    async fn github_profile(&self, access_token: &str) -> anyhow::Result<SocialProfile> {
        let user: GithubUserResponse = self.get_json(GITHUB_USER_API, access_token).await?;
        debug!(login = %user.login, id = user.id, "fetched github user profile");

        let email = match user.email {
            Some(email) => Some(email),
            None => {
                let emails: Vec<GithubEmailResponse> =
                    self.get_json(GITHUB_EMAILS_API, access_token).await?;
                emails
                    .into_iter()
                    .filter(|entry| entry.verified)
                    .max_by_key(|entry| entry.primary)
                    .map(|entry| entry.email)
            }
        };

        Ok(SocialProfile {
            provider: SocialProvider::Github,
            id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            avatar_url: user.avatar_url,
        })
    }

    async fn google_profile(&self, access_token: &str) -> anyhow::Result<SocialProfile> {
        let user: GoogleUserInfo = self.get_json(GOOGLE_USERINFO_API, access_token).await?;
        debug!(sub = %user.sub, "fetched google user profile");

        if user.email.is_some() && user.email_verified == Some(false) {
            return Err(anyhow!("google account email is not verified"));
        }

        Ok(SocialProfile {
            provider: SocialProvider::Google,
            id: user.sub,
            email: user.email,
            name: user.name,
            avatar_url: user.picture,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> anyhow::Result<T> {
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("failed to call {url}"))?
            .error_for_status()
            .with_context(|| format!("{url} returned error"))?
            .json()
            .await
            .with_context(|| format!("failed to decode response from {url}"))
    }
}

#[derive(Deserialize)]
struct GithubUserResponse {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmailResponse {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> OAuthProviderConfig {
        OAuthProviderConfig {
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
        }
    }

    #[test]
    fn unconfigured_provider_yields_no_client() {
        let client =
            OAuthClient::from_config(SocialProvider::Google, &OAuthProviderConfig::default())
                .unwrap();
        assert!(client.is_none());
    }

    #[test]
    fn google_authorize_url_carries_state_and_scopes() {
        let client = OAuthClient::from_config(SocialProvider::Google, &configured())
            .unwrap()
            .unwrap();
        let url = client
            .authorize_url("state-123", "http://localhost:3001/auth/google/callback")
            .unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("state=state-123"));
        assert!(url.contains("openid"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3001%2Fauth%2Fgoogle%2Fcallback"));
    }

    #[test]
    fn github_authorize_url_uses_the_given_redirect() {
        let client = OAuthClient::from_config(SocialProvider::Github, &configured())
            .unwrap()
            .unwrap();
        let first = client
            .authorize_url("one", "http://localhost:3001/auth/github/callback")
            .unwrap();
        let second = client
            .authorize_url("two", "https://conducky.example.org/auth/github/callback")
            .unwrap();

        assert!(first.contains("state=one"));
        assert!(first.contains("localhost%3A3001"));
        assert!(second.contains("state=two"));
        assert!(second.contains("conducky.example.org"));
        assert!(!second.contains("localhost"));
    }

    #[test]
    fn provider_names_round_trip() {
        for provider in [SocialProvider::Github, SocialProvider::Google] {
            assert_eq!(provider.as_str().parse::<SocialProvider>().unwrap(), provider);
        }
        assert!("gitlab".parse::<SocialProvider>().is_err());
    }
}
