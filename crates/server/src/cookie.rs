//! Cookie negotiation.
//!
//! Resolves the session a request belongs to and decides whether the
//! response must carry a `Set-Cookie`.
//!
//! TLS terminates in front of the service, so the scheme a client actually
//! used is only known from a forwarded-protocol header. A session is pinned
//! to the scheme it was minted under; a cookie presented under any other
//! scheme is ignored and a fresh session is minted. A Secure cookie is
//! therefore never honoured over plaintext, and a plaintext session is never
//! silently upgraded.
//!
//! Rules:
//! - Effective scheme: first hop of the forwarded-protocol header when
//!   trusted and parseable, else the transport scheme.
//! - `Set-Cookie` is sent exactly when a session is minted for the request.
//! - Cookie attributes: `Path=/; HttpOnly; SameSite=Lax`, plus `Secure` iff
//!   the effective scheme is https.

use std::sync::Arc;

use axum::http::header::{COOKIE, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ConfigError, ServerConfig};
use crate::session::{EffectiveScheme, Scheme, SchemeSource, Session, SessionId};
use crate::store::{SessionStore, StoreError};

/// What must match between a session and a request for the session to serve
/// the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeAffinity {
    /// Only `http` vs `https`.
    Scheme,
    /// The scheme and whether it came from the transport or a forwarded
    /// header.
    #[default]
    SchemeAndSource,
}

impl SchemeAffinity {
    pub fn admits(&self, recorded: EffectiveScheme, request: EffectiveScheme) -> bool {
        match self {
            Self::Scheme => recorded.scheme == request.scheme,
            Self::SchemeAndSource => recorded == request,
        }
    }
}

/// Failure to resolve a session for a request.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build Set-Cookie header: {0}")]
    Header(#[from] InvalidHeaderValue),
}

/// Session chosen for a request.
#[derive(Debug)]
pub struct Resolution {
    pub session: Arc<Session>,
    /// Present only when the session was minted for this request.
    pub set_cookie: Option<HeaderValue>,
}

/// Maps request headers to sessions.
#[derive(Debug, Clone)]
pub struct CookieNegotiator {
    cookie_name: String,
    forwarded_header: HeaderName,
    trust_forwarded: bool,
    affinity: SchemeAffinity,
    transport: Scheme,
}

impl CookieNegotiator {
    pub fn new(
        cookie_name: impl Into<String>,
        forwarded_header: HeaderName,
        trust_forwarded: bool,
        affinity: SchemeAffinity,
        transport: Scheme,
    ) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            forwarded_header,
            trust_forwarded,
            affinity,
            transport,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let session = &config.session;
        let forwarded_header = HeaderName::try_from(session.forwarded_proto_header.as_str())
            .map_err(|_| ConfigError::Invalid {
                field: "session.forwarded_proto_header",
                reason: format!("{:?} is not a header name", session.forwarded_proto_header),
            })?;
        Ok(Self::new(
            session.cookie_name.clone(),
            forwarded_header,
            session.trust_forwarded_proto,
            session.affinity,
            config.transport_scheme,
        ))
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Scheme the request is treated as arriving over.
    ///
    /// `uri_scheme` is the scheme of an absolute-form request target, if any.
    pub fn effective_scheme(
        &self,
        headers: &HeaderMap,
        uri_scheme: Option<&str>,
    ) -> EffectiveScheme {
        if self.trust_forwarded
            && let Some(scheme) = headers
                .get(&self.forwarded_header)
                .and_then(forwarded_first_hop)
        {
            return EffectiveScheme::forwarded(scheme);
        }
        let scheme = uri_scheme
            .and_then(Scheme::parse)
            .unwrap_or(self.transport);
        EffectiveScheme::transport(scheme)
    }

    /// First well-formed session cookie across all `Cookie` headers.
    pub fn session_cookie(&self, headers: &HeaderMap) -> Option<SessionId> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| name.trim() == self.cookie_name)
            .find_map(|(_, value)| SessionId::parse(value.trim().trim_matches('"')))
    }

    pub fn set_cookie(&self, session: &Session) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name,
            session.id()
        );
        if session.scheme().scheme.is_secure() {
            cookie.push_str("; Secure");
        }
        HeaderValue::try_from(cookie)
    }

    /// Find the request's session, minting one when the cookie is absent,
    /// unknown, expired, or was issued under a different scheme.
    pub fn resolve(
        &self,
        store: &SessionStore,
        headers: &HeaderMap,
        uri_scheme: Option<&str>,
    ) -> Result<Resolution, NegotiationError> {
        let effective = self.effective_scheme(headers, uri_scheme);
        let presented = self.session_cookie(headers);

        let (session, created) = store.get_or_create(presented.as_ref(), effective, |session| {
            let admitted = self.affinity.admits(session.scheme(), effective);
            if !admitted {
                debug!(
                    session = %session.id().short(),
                    recorded = %session.scheme().scheme,
                    request = %effective.scheme,
                    "session cookie presented under a different scheme"
                );
            }
            admitted
        })?;
        if !created {
            return Ok(Resolution {
                session,
                set_cookie: None,
            });
        }

        let set_cookie = self.set_cookie(&session)?;
        info!(
            session = %session.id().short(),
            scheme = %effective.scheme,
            forwarded = effective.source == SchemeSource::Forwarded,
            "minted session"
        );
        Ok(Resolution {
            session,
            set_cookie: Some(set_cookie),
        })
    }
}

/// First comma-separated value of a forwarded-protocol header, if it names
/// a scheme we know.
fn forwarded_first_hop(value: &HeaderValue) -> Option<Scheme> {
    let text = value.to_str().ok()?;
    let first = text.split(',').next()?.trim();
    Scheme::parse(first)
}
