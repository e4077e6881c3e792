use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

/// Mints the three token families that authorise session operations, and the
/// per-round board seeds. Everything is derived from one process-wide secret
/// key that is generated at startup and never persisted: restarting the
/// server invalidates all outstanding tokens, consistent with the session
/// table being truncated on boot.
pub(crate) struct TokenMinter {
    server_key: [u8; 32],
}

impl TokenMinter {
    pub(crate) fn new() -> Self {
        let mut server_key = [0u8; 32];
        rand::rng().fill_bytes(&mut server_key);
        Self { server_key }
    }

    /// Mint the per-session random bytes that bind tokens to a session.
    pub(crate) fn pepper() -> String {
        let mut pepper = [0u8; 8];
        rand::rng().fill_bytes(&mut pepper);
        hex::encode(pepper)
    }

    pub(crate) fn mgmt_token(&self, session_id: i32, pepper: &str) -> String {
        self.salted_token(b"sessman", &[&session_id.to_string(), pepper])
    }

    pub(crate) fn invite_token(&self, session_id: i32, pepper: &str) -> String {
        self.salted_token(b"session", &[&session_id.to_string(), pepper])
    }

    pub(crate) fn player_token(&self, session_id: i32, pepper: &str, player_id: i32) -> String {
        self.salted_token(
            b"player",
            &[&session_id.to_string(), pepper, &player_id.to_string()],
        )
    }

    /// The board seed for one round: binds the board a player sees to the
    /// board the scoring worker reconstructs.
    pub(crate) fn round_seed(&self, round_no: i32, pepper: &str) -> [u8; 32] {
        Sha256::new()
            .chain_update(round_no.to_string())
            .chain_update(pepper)
            .chain_update(self.server_key)
            .finalize()
            .into()
    }

    /// HMAC-SHA1 keyed by SHA1(salt + server key) over the joined arguments,
    /// hex-encoded and thinned to every other digit.
    fn salted_token(&self, salt: &[u8], args: &[&str]) -> String {
        let hmac_key = Sha1::new()
            .chain_update(salt)
            .chain_update(self.server_key)
            .finalize();
        let mut mac = HmacSha1::new_from_slice(&hmac_key).expect("hmac takes keys of any length");
        mac.update(args.concat().as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        digest.chars().step_by(2).collect()
    }
}

/// Constant-time token comparison.
pub(crate) fn tokens_match(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
