//! AWS Signature Version 4 request signing.
//!
//! Only the header-based flavour is implemented: the signer returns the
//! `authorization`, `x-amz-date` and (for temporary credentials)
//! `x-amz-security-token` headers, which the caller adds to its request
//! alongside every header it asked to have signed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static or temporary AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let access_key_id = non_empty("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty("AWS_SECRET_ACCESS_KEY")?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty("AWS_SESSION_TOKEN"),
        })
    }

    /// Credentials from the process environment (the Lambda runtime
    /// exports all three variables).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Signs requests for one service in one region.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign a request at the current time.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, SigningError> {
        self.sign_at(method, url, headers, body, Utc::now())
    }

    /// Sign a request as of `now`. Returns the headers to add.
    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SigningError> {
        let parsed = Url::parse(url).map_err(|e| SigningError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(SigningError::InvalidUrl {
                    url: url.to_string(),
                    reason: "missing host".into(),
                });
            }
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut signed: Vec<(String, String)> = vec![
            ("host".into(), host),
            ("x-amz-date".into(), amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            signed.push(("x-amz-security-token".into(), token.clone()));
        }
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            if !signed.iter().any(|(n, _)| *n == name) {
                signed.push((name, value.trim().to_string()));
            }
        }
        signed.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical = canonical_request(method, &parsed, &signed, body);
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let key = signing_key(&self.credentials.secret_access_key, &date, &self.region, &self.service);
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

        let signed_headers = signed
            .iter()
            .map(|(n, _)| n.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );

        let mut out = vec![
            ("authorization".to_string(), authorization),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        Ok(out)
    }
}

/// Build the canonical request. `headers` must be lowercase and sorted.
fn canonical_request(method: &str, url: &Url, headers: &[(String, String)], body: &[u8]) -> String {
    let path = if url.path().is_empty() { "/" } else { url.path() };
    // Non-S3 services sign the already-encoded path encoded once more.
    let canonical_uri = uri_encode(path, false);

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_headers: String = headers
        .iter()
        .map(|(n, v)| format!("{n}:{v}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(n, _)| n.as_str())
        .collect::<Vec<_>>()
        .join(";");

    format!(
        "{}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{}",
        method.to_ascii_uppercase(),
        hex::encode(Sha256::digest(body))
    )
}

/// RFC 3986 encoding of everything except unreserved characters.
/// `/` is kept unless `encode_slash` is set.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const AKID: &str = "AKIDEXAMPLE";
    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn vanilla_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn derives_documented_signing_key() {
        let key = signing_key(SECRET, "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signs_get_vanilla() {
        let signer = SigV4Signer::new(AwsCredentials::new(AKID, SECRET), "us-east-1", "service");
        let headers = signer
            .sign_at("GET", "https://example.amazonaws.com/", &[], b"", vanilla_time())
            .unwrap();

        let auth = &headers.iter().find(|(n, _)| n == "authorization").unwrap().1;
        assert_eq!(
            auth,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert!(headers.iter().any(|(n, v)| n == "x-amz-date" && v == "20150830T123600Z"));
        assert!(!headers.iter().any(|(n, _)| n == "x-amz-security-token"));
    }

    #[test]
    fn session_token_is_signed_and_returned() {
        let creds = AwsCredentials::new(AKID, SECRET).with_session_token("FwoGZXIvYXdzEXAMPLE");
        let signer = SigV4Signer::new(creds, "ap-northeast-1", "ssm");
        let headers = signer
            .sign_at(
                "POST",
                "https://ssm.ap-northeast-1.amazonaws.com/",
                &[("Content-Type", "application/x-amz-json-1.1"), ("X-Amz-Target", "AmazonSSM.GetParameter")],
                br#"{"Name":"/p/X"}"#,
                vanilla_time(),
            )
            .unwrap();

        let auth = &headers.iter().find(|(n, _)| n == "authorization").unwrap().1;
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"));
        assert!(headers.iter().any(|(n, v)| n == "x-amz-security-token" && v == "FwoGZXIvYXdzEXAMPLE"));
    }

    #[test]
    fn canonical_request_sorts_query_and_double_encodes_path() {
        let url = Url::parse("https://svc.example.com/model/a%3Ab/invoke?b=2&a=x y").unwrap();
        let headers = vec![("host".to_string(), "svc.example.com".to_string())];
        let canonical = canonical_request("post", &url, &headers, b"");
        let lines: Vec<&str> = canonical.lines().collect();
        assert_eq!(lines[0], "POST");
        assert_eq!(lines[1], "/model/a%253Ab/invoke");
        assert_eq!(lines[2], "a=x%20y&b=2");
        assert_eq!(lines[3], "host:svc.example.com");
    }

    #[test]
    fn non_default_port_is_part_of_host() {
        let signer = SigV4Signer::new(AwsCredentials::new(AKID, SECRET), "us-east-1", "service");
        let with_port = signer
            .sign_at("GET", "http://127.0.0.1:9000/", &[], b"", vanilla_time())
            .unwrap();
        let without_port = signer
            .sign_at("GET", "http://127.0.0.1/", &[], b"", vanilla_time())
            .unwrap();
        assert_ne!(with_port[0].1, without_port[0].1);
    }

    #[test]
    fn relative_url_rejected() {
        let signer = SigV4Signer::new(AwsCredentials::new(AKID, SECRET), "us-east-1", "service");
        let err = signer.sign("GET", "/no-host", &[], b"").unwrap_err();
        assert!(matches!(err, SigningError::InvalidUrl { .. }));
    }

    #[test]
    fn credentials_from_lookup_require_both_keys() {
        let only_id = |k: &str| (k == "AWS_ACCESS_KEY_ID").then(|| AKID.to_string());
        assert!(AwsCredentials::from_lookup(only_id).is_none());

        let full = |k: &str| match k {
            "AWS_ACCESS_KEY_ID" => Some(AKID.to_string()),
            "AWS_SECRET_ACCESS_KEY" => Some(SECRET.to_string()),
            "AWS_SESSION_TOKEN" => Some(String::new()),
            _ => None,
        };
        let creds = AwsCredentials::from_lookup(full).unwrap();
        assert!(creds.session_token.is_none());
        assert!(!format!("{creds:?}").contains(SECRET));
    }
}
