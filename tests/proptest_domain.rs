//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to verify that the canonical signed message is
//! deterministic and that every signed field reaches the bytes, and
//! that signer recovery rejects any altered term.

use alloy::hex;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use proptest::prelude::*;
use rust_decimal::Decimal;

use nftlend_core::adapters::chain::recover_evm_signer;
use nftlend_core::domain::canonical::{Field, nonce_key, scale_decimal};
use nftlend_core::domain::{Network, SignedTerms, canonicalize};

fn address_strategy() -> impl Strategy<Value = String> {
    prop::array::uniform20(any::<u8>()).prop_map(hex::encode_prefixed)
}

prop_compose! {
    fn terms_strategy()(
        principal_units in 1u64..1_000_000_000_000,
        currency_decimals in 0u32..19,
        token_id in 0u64..u64::MAX,
        duration in 1u64..10_000_000,
        rate_bps in 0u64..1_000_000,
        admin_fee in 0u64..10_000,
        nonce in 1u64..u64::MAX,
        collateral in address_strategy(),
        currency in address_strategy(),
        counterparty in address_strategy(),
        chain_id in 1u64..100_000,
    ) -> SignedTerms {
        SignedTerms {
            principal_amount: Decimal::new(i64::try_from(principal_units).unwrap(), 2),
            currency_decimals,
            token_id: token_id.to_string(),
            duration,
            interest_rate: Decimal::new(i64::try_from(rate_bps).unwrap(), 4),
            admin_fee,
            nonce_hex: format!("{nonce:#x}"),
            collateral_contract: collateral,
            currency_contract: currency,
            counterparty,
            chain_id,
        }
    }
}

/// Alter one field of `terms` so the encoded value differs.
fn tamper(terms: &SignedTerms, field: Field) -> SignedTerms {
    let mut t = terms.clone();
    match field {
        Field::Principal => t.principal_amount += Decimal::ONE,
        Field::TokenId => {
            t.token_id = (t.token_id.parse::<u128>().unwrap() + 1).to_string();
        }
        Field::Duration => t.duration += 1,
        Field::InterestRate => t.interest_rate += Decimal::ONE,
        Field::AdminFee => t.admin_fee += 1,
        Field::Nonce => {
            let n = u128::from_str_radix(t.nonce_hex.trim_start_matches("0x"), 16).unwrap();
            t.nonce_hex = format!("{:#x}", n + 1);
        }
        Field::CollateralContract => t.collateral_contract = flip_last(&t.collateral_contract),
        Field::CurrencyContract => t.currency_contract = flip_last(&t.currency_contract),
        Field::Counterparty => t.counterparty = flip_last(&t.counterparty),
        Field::ChainId => t.chain_id += 1,
    }
    t
}

fn flip_last(address: &str) -> String {
    let mut bytes = hex::decode(address).unwrap();
    if let Some(last) = bytes.last_mut() {
        *last ^= 0x01;
    }
    hex::encode_prefixed(bytes)
}

const FIELDS: [Field; 10] = [
    Field::Principal,
    Field::TokenId,
    Field::Duration,
    Field::InterestRate,
    Field::AdminFee,
    Field::Nonce,
    Field::CollateralContract,
    Field::CurrencyContract,
    Field::Counterparty,
    Field::ChainId,
];

// ── Canonical message ───────────────────────────────────────

proptest! {
    /// Encoding the same terms twice yields identical bytes.
    #[test]
    fn canonical_encoding_is_deterministic(terms in terms_strategy()) {
        let a = canonicalize(&terms).unwrap();
        let b = canonicalize(&terms.clone()).unwrap();
        prop_assert_eq!(a.to_bytes(), b.to_bytes());
        prop_assert_eq!(a.to_hex(), b.to_hex());
    }

    /// Changing any one signed field changes that field's bytes.
    #[test]
    fn every_field_reaches_the_message(
        terms in terms_strategy(),
        index in 0usize..FIELDS.len(),
    ) {
        let field = FIELDS[index];
        let original = canonicalize(&terms).unwrap();
        let altered = canonicalize(&tamper(&terms, field)).unwrap();
        prop_assert_ne!(original.field_hex(field), altered.field_hex(field));
        prop_assert_ne!(original.to_bytes(), altered.to_bytes());
    }

    /// Address case does not change the encoding.
    #[test]
    fn address_case_is_irrelevant(terms in terms_strategy()) {
        let mut upper = terms.clone();
        upper.counterparty = format!("0x{}", terms.counterparty[2..].to_uppercase());
        prop_assert_eq!(
            canonicalize(&terms).unwrap().to_bytes(),
            canonicalize(&upper).unwrap().to_bytes()
        );
    }

    /// Scaling keeps the integer part exact.
    #[test]
    fn scaled_integers_are_exact(units in 0u64..1_000_000_000, decimals in 0u32..19) {
        let scaled = scale_decimal(Decimal::from(units), decimals).unwrap();
        let expected = alloy::primitives::U256::from(units)
            * alloy::primitives::U256::from(10u64).pow(alloy::primitives::U256::from(decimals));
        prop_assert_eq!(scaled, expected);
    }

    /// Leading zeros and case never change a nonce's identity.
    #[test]
    fn nonce_key_ignores_padding(n in any::<u64>(), pad in 0usize..8) {
        let plain = format!("{n:#x}");
        let padded = format!("0X{}{:X}", "0".repeat(pad), n);
        prop_assert_eq!(nonce_key(&plain), nonce_key(&padded));
    }
}

// ── Signature recovery ──────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A signature over the exact message recovers the signer; over a
    /// tampered message it recovers someone else.
    #[test]
    fn tampered_terms_fail_recovery(
        terms in terms_strategy(),
        index in 0usize..FIELDS.len(),
    ) {
        let signer = PrivateKeySigner::random();
        let expected = format!("{:#x}", signer.address());
        let mut terms = terms;
        terms.counterparty = expected.clone();

        let message = canonicalize(&terms).unwrap().to_bytes();
        let signature = hex::encode_prefixed(signer.sign_message_sync(&message).unwrap().as_bytes());
        prop_assert_eq!(recover_evm_signer(&message, &signature).unwrap(), expected.clone());

        let tampered = canonicalize(&tamper(&terms, FIELDS[index])).unwrap().to_bytes();
        prop_assert_ne!(recover_evm_signer(&tampered, &signature).unwrap(), expected);
    }

    /// Only EVM networks normalize addresses to lowercase.
    #[test]
    fn base58_addresses_keep_case(addr in "[1-9A-HJ-NP-Za-km-z]{32,44}") {
        prop_assert_eq!(Network::Sol.normalize_address(&addr), addr.clone());
        prop_assert_eq!(Network::Matic.normalize_address(&addr), addr.to_lowercase());
    }
}
