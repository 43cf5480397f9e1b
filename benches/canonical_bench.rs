//! Canonical Message Benchmarks - Signed-Listing Hot Path
//!
//! Benchmarks the encoding and recovery work done for every loan and
//! offer request, plus the live-feed frame parser.
//!
//! Run with: cargo bench --bench canonical_bench

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use alloy::hex;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use rust_decimal_macros::dec;

use nftlend_core::adapters::chain::recover_evm_signer;
use nftlend_core::adapters::feeds::solsea::parse_frame;
use nftlend_core::domain::{SignedTerms, canonicalize};

fn terms() -> SignedTerms {
    SignedTerms {
        principal_amount: dec!(1250.5),
        currency_decimals: 18,
        token_id: "4821".into(),
        duration: 2_592_000,
        interest_rate: dec!(0.125),
        admin_fee: 100,
        nonce_hex: "0x17f3a9".into(),
        collateral_contract: "0x60e4d786628fea6478f785a6d7e704777c86a7c6".into(),
        currency_contract: "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619".into(),
        counterparty: "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".into(),
        chain_id: 137,
    }
}

/// Benchmark canonical encoding of one term set.
fn bench_canonicalize(c: &mut Criterion) {
    let terms = terms();

    c.bench_function("canonicalize_terms", |b| {
        b.iter(|| {
            let _msg = canonicalize(black_box(&terms));
        });
    });
}

/// Benchmark EIP-191 signer recovery over the canonical bytes.
fn bench_recover_signer(c: &mut Criterion) {
    let signer = PrivateKeySigner::random();
    let message = canonicalize(&terms()).map(|m| m.to_bytes()).unwrap_or_default();
    let signature = signer
        .sign_message_sync(&message)
        .map(|s| hex::encode_prefixed(s.as_bytes()))
        .unwrap_or_default();

    c.bench_function("recover_evm_signer", |b| {
        b.iter(|| {
            let _addr = recover_evm_signer(black_box(&message), black_box(&signature));
        });
    });
}

/// Benchmark parsing one Solsea trade frame.
fn bench_parse_frame(c: &mut Criterion) {
    let frame = r#"431[{"data":[{"mint":"Mint111","price":1500000000,"sellerKey":"S","buyerKey":"B","status":"SOLD","listedAt":"2022-03-01T10:00:00Z"},{"mint":"Mint222","price":2500000000,"sellerKey":"S2","buyerKey":"B2","status":"SOLD"}]}]"#;

    c.bench_function("parse_solsea_frame", |b| {
        b.iter(|| {
            let _frame = parse_frame(black_box(frame));
        });
    });
}

criterion_group!(
    benches,
    bench_canonicalize,
    bench_recover_signer,
    bench_parse_frame,
);
criterion_main!(benches);
