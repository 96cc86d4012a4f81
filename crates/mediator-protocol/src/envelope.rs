//! Anoncrypt/authcrypt envelope over X25519 + ChaCha20Poly1305.
//!
//! Shaped like a JWE: a `protected` header carrying one entry per recipient
//! (each an X25519-wrapped content-encryption key), an `iv`, `ciphertext`,
//! and `tag`. Authcrypt additionally seals the sender's verkey into the
//! protected header so only a recipient who can unwrap it learns who sent
//! the message.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("recipient key is not valid base58")]
    BadKey,
    #[error("no recipient keys supplied")]
    NoRecipients,
    #[error("envelope is not addressed to this key")]
    NotForMe,
    #[error("decryption failed")]
    DecryptFailed,
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// A mediator or agent keypair. `verkey` is the base58-encoded public key
/// used as the wire identity; the same 32 bytes double as an X25519 public
/// key for key agreement.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: XPublicKey,
}

impl KeyPair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = XPublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn verkey(&self) -> String {
        bs58::encode(self.public.as_bytes()).into_string()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }
}

fn decode_verkey(verkey: &str) -> Result<XPublicKey, EnvelopeError> {
    let bytes = bs58::decode(verkey)
        .into_vec()
        .map_err(|_| EnvelopeError::BadKey)?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| EnvelopeError::BadKey)?;
    Ok(XPublicKey::from(arr))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecipientHeader {
    kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Recipient {
    header: RecipientHeader,
    /// Ephemeral sender public key used for this recipient's key agreement,
    /// base64url.
    epk: String,
    /// Base64url-encoded ChaCha20Poly1305-wrapped content-encryption key.
    encrypted_key: String,
    /// Present only in authcrypt mode: the sender verkey, wrapped under the
    /// same per-recipient key as `encrypted_key` so it stays confidential.
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProtectedHeader {
    enc: String,
    typ: String,
    recipients: Vec<Recipient>,
}

/// A packed message. Serializes to the same JSON shape regardless of
/// anoncrypt/authcrypt mode; the mode is recovered on unpack from whether
/// `sender_key` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protected: String,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

fn b64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn unb64(data: &str) -> Result<Vec<u8>, EnvelopeError> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

fn wrap_key(shared_secret: &[u8; 32], plaintext: &[u8]) -> (Vec<u8>, [u8; 12]) {
    let key = Key::from_slice(shared_secret);
    let cipher = ChaCha20Poly1305::new(key);
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let wrapped = cipher
        .encrypt(nonce, plaintext)
        .expect("chacha20poly1305 encryption is infallible for in-memory buffers");
    (wrapped, nonce_bytes)
}

fn unwrap_key(shared_secret: &[u8; 32], wrapped: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    // The nonce is prefixed onto the wrapped blob by `pack_for_recipient`.
    if wrapped.len() < 12 {
        return Err(EnvelopeError::Malformed("wrapped key too short".into()));
    }
    let (nonce_bytes, ciphertext) = wrapped.split_at(12);
    let key = Key::from_slice(shared_secret);
    let cipher = ChaCha20Poly1305::new(key);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EnvelopeError::DecryptFailed)
}

fn pack_for_recipient(
    cek: &[u8; 32],
    recipient_verkey: &str,
    from: Option<&KeyPair>,
) -> Result<Recipient, EnvelopeError> {
    let recipient_pk = decode_verkey(recipient_verkey)?;
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let epk = XPublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient_pk);
    let kek = derive_kek(shared.as_bytes(), epk.as_bytes());

    let (wrapped_cek, nonce) = wrap_key(&kek, cek);
    let mut encrypted_key = Vec::with_capacity(12 + wrapped_cek.len());
    encrypted_key.extend_from_slice(&nonce);
    encrypted_key.extend_from_slice(&wrapped_cek);

    // Sealed under the same per-recipient `kek` as the content-encryption
    // key above, the only secret both sides derive identically on unpack.
    let sender_key = match from {
        Some(kp) => {
            let (wrapped_vk, vk_nonce) = wrap_key(&kek, kp.verkey().as_bytes());
            let mut blob = Vec::with_capacity(12 + wrapped_vk.len());
            blob.extend_from_slice(&vk_nonce);
            blob.extend_from_slice(&wrapped_vk);
            Some(b64(&blob))
        }
        None => None,
    };

    Ok(Recipient {
        header: RecipientHeader {
            kid: recipient_verkey.to_owned(),
        },
        epk: b64(epk.as_bytes()),
        encrypted_key: b64(&encrypted_key),
        sender_key,
    })
}

fn derive_kek(shared_secret: &[u8; 32], salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(shared_secret);
    hasher.finalize().into()
}

/// Encrypts `plaintext` to every key in `to_verkeys`. When `from` is
/// `Some`, the sender's verkey is sealed into each recipient's header
/// (authcrypt); otherwise the message is anoncrypt.
pub fn pack(
    plaintext: &[u8],
    to_verkeys: &[&str],
    from: Option<&KeyPair>,
) -> Result<Envelope, EnvelopeError> {
    if to_verkeys.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    let mut cek = [0u8; 32];
    OsRng.fill_bytes(&mut cek);

    let mut recipients = Vec::with_capacity(to_verkeys.len());
    for vk in to_verkeys {
        recipients.push(pack_for_recipient(&cek, vk, from)?);
    }

    let protected = ProtectedHeader {
        enc: "chacha20poly1305".to_owned(),
        typ: "application/didcomm-envelope-enc".to_owned(),
        recipients,
    };
    let protected_json =
        serde_json::to_vec(&protected).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    let protected_b64 = b64(&protected_json);

    let mut iv_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut iv_bytes);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&cek));
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv_bytes),
            Payload {
                msg: plaintext,
                aad: protected_b64.as_bytes(),
            },
        )
        .map_err(|_| EnvelopeError::Malformed("encryption failed".into()))?;

    // ChaCha20Poly1305's `encrypt` appends the 16-byte tag; split it back
    // out so the wire shape mirrors a standard JWE.
    let tag_at = sealed.len() - 16;
    let (ciphertext, tag) = sealed.split_at(tag_at);

    Ok(Envelope {
        protected: protected_b64,
        iv: b64(&iv_bytes),
        ciphertext: b64(ciphertext),
        tag: b64(tag),
    })
}

/// Decrypts `envelope` using `my_keys`. Returns the plaintext and, for
/// authcrypt envelopes addressed with a known sender, the sender's verkey.
pub fn unpack(
    envelope: &Envelope,
    my_keys: &KeyPair,
) -> Result<(Vec<u8>, Option<String>), EnvelopeError> {
    let protected_json = unb64(&envelope.protected)?;
    let protected: ProtectedHeader = serde_json::from_slice(&protected_json)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let my_verkey = my_keys.verkey();
    let recipient = protected
        .recipients
        .iter()
        .find(|r| r.header.kid == my_verkey)
        .ok_or(EnvelopeError::NotForMe)?;

    let epk_bytes = unb64(&recipient.epk)?;
    let epk_arr: [u8; 32] = epk_bytes
        .try_into()
        .map_err(|_| EnvelopeError::Malformed("bad epk".into()))?;
    let epk = XPublicKey::from(epk_arr);

    let shared = my_keys.secret.diffie_hellman(&epk);
    let kek = derive_kek(shared.as_bytes(), epk.as_bytes());
    let wrapped = unb64(&recipient.encrypted_key)?;
    let cek_vec = unwrap_key(&kek, &wrapped)?;
    let cek: [u8; 32] = cek_vec
        .try_into()
        .map_err(|_| EnvelopeError::Malformed("bad cek".into()))?;

    let sender_verkey = match &recipient.sender_key {
        Some(blob) => {
            // authcrypt: sealed under the same per-recipient `kek` as the
            // content-encryption key, so it unwraps with the same key.
            let wrapped_vk = unb64(blob)?;
            unwrap_key(&kek, &wrapped_vk)
                .ok()
                .and_then(|vk_bytes| String::from_utf8(vk_bytes).ok())
        }
        None => None,
    };

    let iv = unb64(&envelope.iv)?;
    let ciphertext = unb64(&envelope.ciphertext)?;
    let tag = unb64(&envelope.tag)?;
    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&cek));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: envelope.protected.as_bytes(),
            },
        )
        .map_err(|_| EnvelopeError::DecryptFailed)?;

    Ok((plaintext, sender_verkey))
}

/// Enumerates the recipient kids ("kid" = verkey) an envelope is addressed
/// to, without decrypting anything. Used by the Forward Router to decide
/// whether the mediator is a direct recipient.
pub fn recipient_kids(envelope: &Envelope) -> Result<Vec<String>, EnvelopeError> {
    let protected_json = unb64(&envelope.protected)?;
    let protected: ProtectedHeader = serde_json::from_slice(&protected_json)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    Ok(protected.recipients.into_iter().map(|r| r.header.kid).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anoncrypt_round_trips() {
        let recipient = KeyPair::generate();
        let plaintext = b"hello mediator";
        let envelope = pack(plaintext, &[&recipient.verkey()], None).expect("pack");
        let (decrypted, sender) = unpack(&envelope, &recipient).expect("unpack");
        assert_eq!(decrypted, plaintext);
        assert_eq!(sender, None);
    }

    #[test]
    fn authcrypt_reveals_sender_verkey() {
        let recipient = KeyPair::generate();
        let sender = KeyPair::generate();
        let plaintext = b"hi";
        let envelope = pack(plaintext, &[&recipient.verkey()], Some(&sender)).expect("pack");
        let (decrypted, sender_vk) = unpack(&envelope, &recipient).expect("unpack");
        assert_eq!(decrypted, plaintext);
        assert_eq!(sender_vk, Some(sender.verkey()));
    }

    #[test]
    fn unpack_fails_for_wrong_recipient() {
        let recipient = KeyPair::generate();
        let other = KeyPair::generate();
        let envelope = pack(b"secret", &[&recipient.verkey()], None).expect("pack");
        assert!(matches!(
            unpack(&envelope, &other),
            Err(EnvelopeError::NotForMe)
        ));
    }

    #[test]
    fn pack_to_multiple_recipients_each_can_decrypt() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let envelope = pack(b"broadcast", &[&a.verkey(), &b.verkey()], None).expect("pack");
        assert_eq!(unpack(&envelope, &a).unwrap().0, b"broadcast");
        assert_eq!(unpack(&envelope, &b).unwrap().0, b"broadcast");
    }

    #[test]
    fn recipient_kids_lists_every_addressed_verkey() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let envelope = pack(b"x", &[&a.verkey(), &b.verkey()], None).expect("pack");
        let kids = recipient_kids(&envelope).expect("kids");
        assert!(kids.contains(&a.verkey()));
        assert!(kids.contains(&b.verkey()));
    }
}
