//! Property-Based Tests — Order Hashing and Signing Invariants
//!
//! Uses `proptest` to verify that the canonical order digest and the
//! typed-data signature hold their invariants across random inputs.

mod common;

use alloy::primitives::Address;
use proptest::prelude::*;
use rust_decimal::Decimal;

use common::test_signer;
use orion_broker::adapters::chain::signer::hash_order;
use orion_broker::domain::order::{Side, SubOrder, SubOrderStatus, Trade, TradeStatus};
use orion_broker::domain::settlement::BlockchainOrder;
use orion_broker::domain::token::to_base_units;

fn arb_address() -> impl Strategy<Value = String> {
    any::<[u8; 20]>().prop_map(|bytes| Address::from(bytes).to_checksum(None))
}

prop_compose! {
    fn arb_order()(
        sender in arb_address(),
        matcher in arb_address(),
        base in arb_address(),
        quote in arb_address(),
        fee_asset in arb_address(),
        amount in any::<u64>(),
        price in any::<u64>(),
        matcher_fee in any::<u64>(),
        nonce in any::<u64>(),
        expiration in any::<u64>(),
        buy_side in 0u8..=1,
    ) -> BlockchainOrder {
        BlockchainOrder {
            id: String::new(),
            sender_address: sender,
            matcher_address: matcher,
            base_asset: base,
            quote_asset: quote,
            matcher_fee_asset: fee_asset,
            amount,
            price,
            matcher_fee,
            nonce,
            expiration,
            buy_side,
            signature: String::new(),
        }
    }
}

proptest! {
    /// Hashing the same order twice yields the same digest.
    #[test]
    fn hash_is_stable(order in arb_order()) {
        let first = hash_order(&order).unwrap();
        let second = hash_order(&order).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Changing any single integer field changes the digest.
    #[test]
    fn hash_depends_on_every_field(order in arb_order(), field in 0usize..6) {
        let base = hash_order(&order).unwrap();

        let mut perturbed = order.clone();
        match field {
            0 => perturbed.amount = perturbed.amount.wrapping_add(1),
            1 => perturbed.price = perturbed.price.wrapping_add(1),
            2 => perturbed.matcher_fee = perturbed.matcher_fee.wrapping_add(1),
            3 => perturbed.nonce = perturbed.nonce.wrapping_add(1),
            4 => perturbed.expiration = perturbed.expiration.wrapping_add(1),
            _ => perturbed.buy_side ^= 1,
        }

        prop_assert_ne!(hash_order(&perturbed).unwrap(), base);
    }

    /// The digest is insensitive to the mutable envelope fields.
    #[test]
    fn hash_ignores_id_and_signature(order in arb_order()) {
        let base = hash_order(&order).unwrap();

        let mut tagged = order.clone();
        tagged.id = "0xffff".to_string();
        tagged.signature = "0xeeee".to_string();

        prop_assert_eq!(hash_order(&tagged).unwrap(), base);
    }

    /// Signing a trade is a pure function: same inputs, identical bytes.
    #[test]
    fn signing_is_deterministic(
        id in 1u64..1_000_000,
        timestamp in 1_500_000_000_000u64..2_000_000_000_000,
        price_cents in 1u64..10_000_000,
        amount_sats in 1u64..100_000_000,
        buy in any::<bool>(),
    ) {
        let signer = test_signer();
        let price = Decimal::new(price_cents as i64, 2);
        let amount = Decimal::new(amount_sats as i64, 8);

        let sub = SubOrder {
            id,
            symbol: "BTC-USDT".to_string(),
            side: if buy { Side::Buy } else { Side::Sell },
            price,
            amount,
            exchange: "binance".to_string(),
            timestamp,
            status: SubOrderStatus::Filled,
            filled_amount: amount,
            exchange_order_id: Some(format!("e{id}")),
            sent_to_aggregator: false,
        };
        let trade = Trade {
            exchange: "binance".to_string(),
            exchange_order_id: format!("e{id}"),
            price,
            amount,
            status: TradeStatus::Filled,
        };

        let first = signer.sign_trade(&sub, &trade).unwrap();
        let second = signer.sign_trade(&sub, &trade).unwrap();
        let recomputed = hash_order(&first).unwrap();

        prop_assert_eq!(&first.id, &second.id);
        prop_assert_eq!(&first.signature, &second.signature);
        prop_assert_eq!(&first.id, &recomputed);
        prop_assert_eq!(first.buy_side, u8::from(buy));
        prop_assert_eq!(first.nonce, timestamp);
    }

    /// Base-unit scaling is exact for values with at most 8 decimals.
    #[test]
    fn base_units_scale_exactly(sats in 0i64..i64::MAX) {
        let value = Decimal::new(sats, 8);
        prop_assert_eq!(to_base_units(value).unwrap(), sats as u64);
    }
}
