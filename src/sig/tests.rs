use super::{hash_to_eth_signed_msg_hash, recover_signer, verify, DigestSigner, Error, Signer};
use crate::{Address, Hash, Signature, U256};
use rand::{rngs::StdRng, SeedableRng};

// Well-known development keys (Hardhat/Ganache accounts 0 and 1). Do not use
// them for anything real.
const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const ADDR_0: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const KEY_1: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const ADDR_1: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

// secp256k1 group order
const ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// The other valid signature over the same digest: `s` replaced by `n - s`
/// and the recovery byte flipped. It recovers to the same key.
pub(crate) fn high_s_twin(sig: Signature) -> Signature {
    let s = U256::from_big_endian(&ORDER) - U256::from_big_endian(&sig.0[32..64]);
    let mut twin = sig;
    s.to_big_endian(&mut twin.0[32..64]);
    twin.0[64] = if sig.v() == 27 { 28 } else { 27 };
    twin
}

fn data() -> Hash {
    // keccak256(abi.encodePacked(uint256(800), uint256(1200), uint256(1), address(0x5FbD...)))
    "0x11e6679e09f41f7cf117a5134122bfdf75ee46c2d14b2ef3c64ded8756adf036"
        .parse()
        .unwrap()
}

#[test]
fn address_from_secret() {
    let signer = Signer::from_secret_hex(KEY_0).unwrap();
    assert_eq!(signer.address(), ADDR_0.parse::<Address>().unwrap());

    let signer = Signer::from_secret_hex(KEY_1).unwrap();
    assert_eq!(signer.address(), ADDR_1.parse::<Address>().unwrap());
}

#[test]
fn invalid_secrets() {
    assert!(matches!(
        Signer::from_secret_hex("0x1234"),
        Err(Error::InvalidSecretKey(_))
    ));
    assert!(matches!(
        Signer::from_secret_hex("not hex"),
        Err(Error::InvalidSecretKey(_))
    ));
    // Zero is not a valid scalar
    assert!(Signer::from_secret_bytes(&[0u8; 32]).is_err());
}

#[test]
fn eth_signed_message_prefix() {
    let expected: Hash = "0xa50ee5f50977ac67c926b79b34288d111590527b047b93d8210b0d0469053552"
        .parse()
        .unwrap();
    assert_eq!(hash_to_eth_signed_msg_hash(data()), expected);
}

#[test]
fn sign_and_recover() {
    let signer = Signer::from_secret_hex(KEY_0).unwrap();
    let sig = signer.sign_eth(data()).unwrap();

    assert!(sig.v() == 27 || sig.v() == 28);
    // low-s
    assert_eq!(sig.0[32] & 0x80, 0);

    assert_eq!(recover_signer(data(), sig).unwrap(), signer.address());
    assert!(verify(signer.address(), data(), sig).unwrap());
}

#[test]
fn signing_is_deterministic() {
    let signer = Signer::from_secret_hex(KEY_1).unwrap();
    assert_eq!(
        signer.sign_eth(data()).unwrap(),
        signer.sign_digest(data()).unwrap()
    );
}

#[test]
fn random_signers_round_trip() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = Signer::new(&mut rng);
    let b = Signer::new(&mut rng);
    assert_ne!(a.address(), b.address());

    let sig = b.sign_eth(data()).unwrap();
    assert_eq!(recover_signer(data(), sig).unwrap(), b.address());
}

#[test]
fn other_signer_is_a_mismatch_not_an_error() {
    let a = Signer::from_secret_hex(KEY_0).unwrap();
    let b = Signer::from_secret_hex(KEY_1).unwrap();
    let sig = b.sign_eth(data()).unwrap();

    assert!(!verify(a.address(), data(), sig).unwrap());
}

#[test]
fn signature_over_other_digest_does_not_verify() {
    let signer = Signer::from_secret_hex(KEY_0).unwrap();
    let sig = signer.sign_eth(data()).unwrap();

    let mut other = data();
    other.0[0] ^= 1;
    // Recovery succeeds but yields some unrelated key
    assert!(!verify(signer.address(), other, sig).unwrap());
}

#[test]
fn bad_recovery_byte() {
    let signer = Signer::from_secret_hex(KEY_0).unwrap();
    let mut sig = signer.sign_eth(data()).unwrap();
    sig.0[64] = 0;

    assert!(matches!(
        recover_signer(data(), sig),
        Err(Error::InvalidRecoveryId(0))
    ));
}

#[test]
fn zero_signature_is_malformed() {
    let sig = Signature::new(&[0u8; 64], 27);
    let res = recover_signer(data(), sig);
    assert!(matches!(res, Err(Error::InvalidEncoding(_))));
    assert!(verify(Address::default(), data(), sig).is_err());
}

#[test]
fn high_s_is_rejected() {
    let signer = Signer::from_secret_hex(KEY_0).unwrap();
    let sig = signer.sign_eth(data()).unwrap();
    let twin = high_s_twin(sig);
    assert_ne!(twin, sig);
    assert_eq!(twin.0[..32], sig.0[..32]);

    assert!(matches!(recover_signer(data(), twin), Err(Error::NonCanonicalS)));
    assert!(matches!(
        verify(signer.address(), data(), twin),
        Err(Error::NonCanonicalS)
    ));
    // Twin of the twin is the original again
    assert_eq!(high_s_twin(twin), sig);
}

#[test]
fn half_order_is_the_largest_accepted_s() {
    let signer = Signer::from_secret_hex(KEY_1).unwrap();
    let mut sig = signer.sign_eth(data()).unwrap();

    sig.0[32..64].copy_from_slice(&super::k256::HALF_ORDER);
    // Not rejected for its s value, whatever recovery makes of it
    assert!(!matches!(recover_signer(data(), sig), Err(Error::NonCanonicalS)));

    sig.0[63] += 1;
    assert!(matches!(recover_signer(data(), sig), Err(Error::NonCanonicalS)));
}
