//! Canonical Message - Deterministic Encoding of Signed Loan Terms
//!
//! Loan listings and offers are authorized by a wallet signature over
//! the same byte message the on-chain lending contract verifies. The
//! message is the concatenation, in fixed order, of:
//!
//! 1. principal scaled to the currency's integer precision
//! 2. collateral token id
//! 3. duration in seconds
//! 4. interest rate scaled to 4 decimal places
//! 5. network admin fee
//! 6. nonce bytes
//! 7. collateral contract address
//! 8. currency contract address
//! 9. counterparty address (borrower for listings, lender for offers)
//! 10. chain id
//!
//! Integers are minimal big-endian byte strings (zero encodes as one
//! `00` byte); addresses are their 20 raw bytes.

use std::str::FromStr;

use alloy::hex;
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;

use super::error::{LendError, LendResult};

/// Fixed-point precision of the interest rate field.
pub const INTEREST_RATE_DECIMALS: u32 = 4;

/// Position of each field inside the canonical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Principal = 0,
    TokenId,
    Duration,
    InterestRate,
    AdminFee,
    Nonce,
    CollateralContract,
    CurrencyContract,
    Counterparty,
    ChainId,
}

/// Terms covered by a listing or offer signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTerms {
    pub principal_amount: Decimal,
    pub currency_decimals: u32,
    pub token_id: String,
    pub duration: u64,
    pub interest_rate: Decimal,
    pub admin_fee: u64,
    pub nonce_hex: String,
    pub collateral_contract: String,
    pub currency_contract: String,
    pub counterparty: String,
    pub chain_id: u64,
}

/// Encoded message, kept per field for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    fields: Vec<Vec<u8>>,
}

impl CanonicalMessage {
    /// Hex encoding of one field, without `0x`.
    pub fn field_hex(&self, field: Field) -> String {
        hex::encode(&self.fields[field as usize])
    }

    /// Full message as `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(self.to_bytes())
    }

    /// Raw bytes signed by the wallet.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.fields.concat()
    }
}

/// Encode terms into the canonical message.
///
/// # Errors
/// `Validation` if an amount is negative, an integer or address does
/// not parse, or the nonce is not hex.
pub fn canonicalize(terms: &SignedTerms) -> LendResult<CanonicalMessage> {
    let fields = vec![
        minimal_bytes(scale_decimal(terms.principal_amount, terms.currency_decimals)?),
        minimal_bytes(parse_integer(&terms.token_id)?),
        minimal_bytes(U256::from(terms.duration)),
        minimal_bytes(scale_decimal(terms.interest_rate, INTEREST_RATE_DECIMALS)?),
        minimal_bytes(U256::from(terms.admin_fee)),
        nonce_bytes(&terms.nonce_hex)?,
        address_bytes(&terms.collateral_contract)?,
        address_bytes(&terms.currency_contract)?,
        address_bytes(&terms.counterparty)?,
        minimal_bytes(U256::from(terms.chain_id)),
    ];
    Ok(CanonicalMessage { fields })
}

/// Scale a decimal to an integer with `decimals` fractional digits.
///
/// Digits beyond the precision are truncated, matching the contract's
/// integer arithmetic.
pub fn scale_decimal(amount: Decimal, decimals: u32) -> LendResult<U256> {
    if amount < Decimal::ZERO {
        return Err(LendError::validation(format!(
            "amount {amount} must not be negative"
        )));
    }
    let text = amount.normalize().to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let frac: String = frac_part
        .chars()
        .chain(std::iter::repeat('0'))
        .take(decimals as usize)
        .collect();
    let digits = format!("{int_part}{frac}");
    U256::from_str_radix(&digits, 10)
        .map_err(|e| LendError::validation(format!("amount {amount} out of range: {e}")))
}

/// Parse a decimal (or `0x` hex) unsigned integer such as a token id.
pub fn parse_integer(value: &str) -> LendResult<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LendError::validation("integer field is empty"));
    }
    U256::from_str(trimmed)
        .map_err(|e| LendError::validation(format!("{trimmed:?} is not an unsigned integer: {e}")))
}

/// Comparable form of a hex nonce: no prefix, no leading zeros, lowercase.
pub fn nonce_key(nonce: &str) -> String {
    let lower = nonce.trim().to_lowercase();
    let digits = lower.strip_prefix("0x").unwrap_or(&lower);
    let key = digits.trim_start_matches('0');
    if key.is_empty() { "0".to_string() } else { key.to_string() }
}

fn minimal_bytes(value: U256) -> Vec<u8> {
    let full = value.to_be_bytes::<32>();
    let start = full.iter().position(|b| *b != 0).unwrap_or(full.len() - 1);
    full[start..].to_vec()
}

fn nonce_bytes(nonce: &str) -> LendResult<Vec<u8>> {
    let lower = nonce.trim().to_lowercase();
    let digits = lower.strip_prefix("0x").unwrap_or(&lower);
    if digits.is_empty() {
        return Err(LendError::validation("nonce is empty"));
    }
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    hex::decode(&padded).map_err(|e| LendError::validation(format!("nonce {nonce:?} is not hex: {e}")))
}

fn address_bytes(address: &str) -> LendResult<Vec<u8>> {
    let parsed = Address::from_str(address.trim())
        .map_err(|e| LendError::validation(format!("{address:?} is not an address: {e}")))?;
    Ok(parsed.as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn terms() -> SignedTerms {
        SignedTerms {
            principal_amount: dec!(100),
            currency_decimals: 6,
            token_id: "42".into(),
            duration: 86_400,
            interest_rate: dec!(0.12),
            admin_fee: 100,
            nonce_hex: "0x01".into(),
            collateral_contract: "0x1111111111111111111111111111111111111111".into(),
            currency_contract: "0x2222222222222222222222222222222222222222".into(),
            counterparty: "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".into(),
            chain_id: 137,
        }
    }

    #[test]
    fn test_principal_scaled_to_currency_decimals() {
        let msg = canonicalize(&terms()).unwrap();
        assert_eq!(msg.field_hex(Field::Principal), "05f5e100");
        assert_eq!(u64::from_str_radix("05f5e100", 16).unwrap(), 100_000_000);
    }

    #[test]
    fn test_tampered_principal_changes_field() {
        let original = canonicalize(&terms()).unwrap();
        let mut t = terms();
        t.principal_amount = dec!(101);
        let tampered = canonicalize(&t).unwrap();
        assert_ne!(
            original.field_hex(Field::Principal),
            tampered.field_hex(Field::Principal)
        );
        assert_ne!(original.to_bytes(), tampered.to_bytes());
    }

    #[test]
    fn test_rate_scaled_to_four_places_and_truncated() {
        assert_eq!(scale_decimal(dec!(0.12), 4).unwrap(), U256::from(1200));
        assert_eq!(scale_decimal(dec!(0.123456), 4).unwrap(), U256::from(1234));
        assert_eq!(scale_decimal(dec!(7), 0).unwrap(), U256::from(7));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(matches!(
            scale_decimal(dec!(-1), 6),
            Err(LendError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_encodes_as_single_byte() {
        assert_eq!(minimal_bytes(U256::ZERO), vec![0u8]);
        assert_eq!(minimal_bytes(U256::from(256)), vec![1u8, 0]);
    }

    #[test]
    fn test_addresses_are_case_insensitive() {
        let mut upper = terms();
        upper.counterparty = "0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD".into();
        assert_eq!(canonicalize(&upper).unwrap(), canonicalize(&terms()).unwrap());
    }

    #[test]
    fn test_message_layout() {
        let msg = canonicalize(&terms()).unwrap();
        assert_eq!(msg.field_hex(Field::TokenId), "2a");
        assert_eq!(msg.field_hex(Field::Duration), "015180");
        assert_eq!(msg.field_hex(Field::Nonce), "01");
        assert_eq!(msg.field_hex(Field::ChainId), "89");
        // 4 + 1 + 3 + 2 + 1 + 1 + 3 * 20 + 1
        assert_eq!(msg.to_bytes().len(), 73);
        assert!(msg.to_hex().starts_with("0x05f5e100"));
    }

    #[test]
    fn test_bad_inputs_rejected() {
        let mut t = terms();
        t.nonce_hex = "0xzz".into();
        assert!(canonicalize(&t).is_err());

        let mut t = terms();
        t.token_id = "abc".into();
        assert!(canonicalize(&t).is_err());

        let mut t = terms();
        t.collateral_contract = "0x1234".into();
        assert!(canonicalize(&t).is_err());
    }

    #[test]
    fn test_nonce_key() {
        assert_eq!(nonce_key("0x0001"), "1");
        assert_eq!(nonce_key("0X1"), "1");
        assert_eq!(nonce_key("0x00"), "0");
        assert_eq!(nonce_key("AbC"), "abc");
    }
}
