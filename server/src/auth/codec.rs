//! Token signing and verification.
//!
//! Tokens are JWTs signed with an asymmetric key: only nodes holding the
//! private key can issue, every node holding the public key can verify.
//! Keys are read once at startup; a `TokenCodec` is immutable afterwards.

use std::fs;
use std::time::Duration;

use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use shared::types::server_config::{AuthConfig, SigningAlgorithm};
use shared::types::Claims;
use tracing::{debug, info};

use super::errors::{SigningError, TokenError};

/// A signed token together with the claims it encodes.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }
}

pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    validation: Validation,
    /// Same checks minus the time window; used to size denylist entries for
    /// tokens that may already be past `exp`.
    lifetime_validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.encoding_key.is_some())
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec from PEM bytes.  `private_pem = None` yields a
    /// verify-only codec.
    pub fn from_pem(
        algorithm: SigningAlgorithm,
        private_pem: Option<&[u8]>,
        public_pem: &[u8],
        issuer: &str,
        audience: &str,
        leeway_secs: u64,
    ) -> Result<Self, SigningError> {
        let encoding_key = private_pem
            .map(|pem| encoding_key(algorithm, pem))
            .transpose()?;
        let decoding_key = decoding_key(algorithm, public_pem)?;
        let alg = jwt_algorithm(algorithm);

        let mut validation = Validation::new(alg);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        let mut lifetime_validation = validation.clone();
        lifetime_validation.validate_exp = false;
        lifetime_validation.validate_nbf = false;

        Ok(Self {
            algorithm: alg,
            encoding_key,
            decoding_key,
            validation,
            lifetime_validation,
        })
    }

    /// Load key material from the paths named in the auth config.
    pub fn from_config(auth: &AuthConfig) -> Result<Self, SigningError> {
        let private_pem = match auth.resolved_private_key_path() {
            Some(path) => Some(read_key_file(&path)?),
            None => {
                info!("No private key configured; token issuing is disabled on this node");
                None
            }
        };
        let public_pem = read_key_file(&auth.public_key_path)?;

        let codec = Self::from_pem(
            auth.algorithm,
            private_pem.as_deref(),
            &public_pem,
            &auth.issuer,
            &auth.audience,
            auth.leeway_secs,
        )?;

        info!("Token codec ready ({}, signing={})", auth.algorithm, codec.can_sign());
        Ok(codec)
    }

    pub fn can_sign(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Tolerance past `exp` during which [`parse`](Self::parse) still
    /// accepts a token.
    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.validation.leeway)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, SigningError> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or(SigningError::MissingPrivateKey)?;

        check_structure(claims)?;

        jsonwebtoken::encode(&Header::new(self.algorithm), claims, key)
            .map_err(|e| SigningError::Encode(e.to_string()))
    }

    /// Sign `claims` and keep them alongside the token.
    pub fn issue(&self, claims: Claims) -> Result<IssuedToken, SigningError> {
        let token = self.sign(&claims)?;
        debug!("Issued token jti={} for {}", claims.jti, claims.username);
        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, time window, issuer and audience.
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?;
        check_decoded(&data.claims)?;
        Ok(data.claims)
    }

    /// Verify the token but ignore `exp` / `nbf`.
    ///
    /// Only used to learn how long a superseded token could still live.
    pub fn parse_ignoring_lifetime(&self, token: &str) -> Result<Claims, TokenError> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.lifetime_validation)
                .map_err(classify)?;
        Ok(data.claims)
    }
}

fn jwt_algorithm(algorithm: SigningAlgorithm) -> Algorithm {
    match algorithm {
        SigningAlgorithm::Rs256 => Algorithm::RS256,
        SigningAlgorithm::Es256 => Algorithm::ES256,
        SigningAlgorithm::EdDsa => Algorithm::EdDSA,
    }
}

fn encoding_key(algorithm: SigningAlgorithm, pem: &[u8]) -> Result<EncodingKey, SigningError> {
    let key = match algorithm {
        SigningAlgorithm::Rs256 => EncodingKey::from_rsa_pem(pem),
        SigningAlgorithm::Es256 => EncodingKey::from_ec_pem(pem),
        SigningAlgorithm::EdDsa => EncodingKey::from_ed_pem(pem),
    };
    key.map_err(|e| SigningError::InvalidKey {
        kind: "private",
        reason: e.to_string(),
    })
}

fn decoding_key(algorithm: SigningAlgorithm, pem: &[u8]) -> Result<DecodingKey, SigningError> {
    let key = match algorithm {
        SigningAlgorithm::Rs256 => DecodingKey::from_rsa_pem(pem),
        SigningAlgorithm::Es256 => DecodingKey::from_ec_pem(pem),
        SigningAlgorithm::EdDsa => DecodingKey::from_ed_pem(pem),
    };
    key.map_err(|e| SigningError::InvalidKey {
        kind: "public",
        reason: e.to_string(),
    })
}

fn read_key_file(path: &str) -> Result<Vec<u8>, SigningError> {
    fs::read(path).map_err(|source| SigningError::KeyFile {
        path: path.to_string(),
        source,
    })
}

fn check_structure(claims: &Claims) -> Result<(), SigningError> {
    if claims.exp <= claims.iat {
        return Err(SigningError::InvalidClaims("exp must be after iat"));
    }
    if claims.nbf > claims.exp {
        return Err(SigningError::InvalidClaims("nbf must not be after exp"));
    }
    if claims.username.is_empty() || claims.sub.is_empty() {
        return Err(SigningError::InvalidClaims("username is empty"));
    }
    if claims.jti.is_empty() {
        return Err(SigningError::InvalidClaims("jti is empty"));
    }
    Ok(())
}

fn check_decoded(claims: &Claims) -> Result<(), TokenError> {
    if claims.exp <= claims.iat || claims.sub != claims.username || claims.jti.is_empty() {
        return Err(TokenError::InvalidClaims);
    }
    Ok(())
}

/// Map a library error onto the token taxonomy.
fn classify(err: JwtError) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenError::Malformed,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => TokenError::UnverifiableKey,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => TokenError::InvalidClaims,
        _ => TokenError::Malformed,
    }
}
