#![allow(non_snake_case)]
use alloy::primitives::U256;
use futures::FutureExt;
use poppies_slot::{
    RejectReason,
    SlotClient,
    SpinAttemptResult,
    SpinCost,
    gas::GasConfig,
    network::ChainDescriptor,
    orchestrator::SpinSettings,
    state::FundsCheck,
    test_helpers::*,
};
use std::sync::Arc;

fn connected_client(
    contract: FakeSpinContract,
) -> (SlotClient<FakeWallet>, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let client = SlotClient::new(
        Arc::new(FakeWallet::on_chain(10143).with_contract(contract)),
        ChainDescriptor::monad_testnet(),
        SLOT_MACHINE,
        GasConfig::default(),
        SpinSettings::default(),
        observer.clone(),
    );
    (client, observer)
}

#[tokio::test]
async fn spin__standard_cost_without_funds_is_rejected_and_raises_signal() {
    // given
    let contract = FakeSpinContract::new().with_balance(U256::from(5_000_000_000_000_000u64));
    let sent = contract.sent_spins();
    let (client, observer) = connected_client(contract);
    client.connect().await.unwrap();
    assert_eq!(
        client.spin_cost(),
        SpinCost::Standard(U256::from(100_000_000_000_000_000u64))
    );

    // when
    let result = client.spin().await;

    // then
    assert_eq!(
        result,
        SpinAttemptResult::Rejected(RejectReason::InsufficientFunds)
    );
    assert_eq!(RejectReason::InsufficientFunds.as_str(), "insufficient-funds");
    assert_eq!(observer.insufficient_funds_signals(), vec![true]);
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn check_funds__after_top_up_lowers_signal() {
    // given
    let contract = FakeSpinContract::new();
    let chain = contract.clone();
    let (client, observer) = connected_client(contract);
    client.connect().await.unwrap();
    client.spin().await;

    // when
    let still_short = client.check_funds().await;
    chain.set_balance(U256::from(1_000_000_000_000_000_000u64));
    let topped_up = client.check_funds().await;

    // then
    assert!(matches!(still_short, FundsCheck::Insufficient { .. }));
    assert_eq!(topped_up, FundsCheck::Sufficient);
    assert_eq!(observer.insufficient_funds_signals(), vec![true, false]);
}

#[tokio::test]
async fn spin__cherry_triple_is_decoded() {
    // given
    let contract = FakeSpinContract::new()
        .with_balance(U256::from(1_000_000_000_000_000_000u64))
        .with_receipt_logs(vec![
            unrelated_log(9),
            spin_result_log(spin_result_event(
                "CHERRY|CHERRY|CHERRY",
                450_000_000_000_000_000,
                2,
            )),
        ]);
    let (client, observer) = connected_client(contract);
    client.connect().await.unwrap();

    // when
    let result = client.spin().await;

    // then
    let SpinAttemptResult::Success(outcome) = &result else {
        panic!("expected a decoded outcome, got {result:?}");
    };
    assert_eq!(outcome.combination, vec!["CHERRY", "CHERRY", "CHERRY"]);
    assert_eq!(outcome.mon_reward, "0.45");
    assert_eq!(outcome.extra_spins_granted, 2);
    assert!(!outcome.nft_won);
    assert_eq!(observer.settled(), vec![result.clone()]);
}

#[tokio::test]
async fn spin__discounted_spin_sends_discounted_price() {
    let contract = FakeSpinContract::new()
        .with_balance(U256::from(1_000_000_000_000_000_000u64))
        .with_discount(2)
        .with_receipt_logs(vec![spin_result_log(spin_result_event(
            "LEMON|LEMON|GRAPE",
            0,
            0,
        ))]);
    let sent = contract.sent_spins();
    let (client, _) = connected_client(contract);
    client.connect().await.unwrap();

    let result = client.spin().await;

    assert!(matches!(result, SpinAttemptResult::Success(_)));
    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].value, U256::from(10_000_000_000_000_000u64));
}

#[tokio::test]
async fn spin__uses_network_fees_with_headroom() {
    // given
    let contract = FakeSpinContract::new()
        .with_free_spins(1)
        .with_fees(poppies_slot::contract::FeeData {
            max_fee_per_gas: Some(100_000_000_000),
            max_priority_fee_per_gas: Some(500_000_000),
        });
    let sent = contract.sent_spins();
    let (client, _) = connected_client(contract);
    client.connect().await.unwrap();

    // when
    client.spin().await;

    // then
    let gas = sent.lock().unwrap()[0].gas;
    assert_eq!(gas.gas_limit, 300_000);
    assert_eq!(gas.max_fee_per_gas, 120_000_000_000);
    // 0.6 gwei raised to the 1 gwei floor
    assert_eq!(gas.max_priority_fee_per_gas, 1_000_000_000);
}

#[tokio::test]
async fn spin__fee_query_failure_falls_back() {
    let contract = FakeSpinContract::new().with_free_spins(1);
    contract.fail(FakeRead::Fees);
    let sent = contract.sent_spins();
    let (client, _) = connected_client(contract);
    client.connect().await.unwrap();

    client.spin().await;

    let gas = sent.lock().unwrap()[0].gas;
    assert_eq!(gas.max_fee_per_gas, 50_000_000_000);
    assert_eq!(gas.max_priority_fee_per_gas, 2_000_000_000);
}

#[tokio::test]
async fn spin__second_call_while_pending_is_rejected_without_second_submission() {
    // given
    let contract = FakeSpinContract::new()
        .with_free_spins(1)
        .holding_receipt();
    let release = contract.receipt_gate();
    let sent = contract.sent_spins();
    let (client, _) = connected_client(contract);
    client.connect().await.unwrap();

    // when
    let first = client.spin();
    let second = client.spin().now_or_never();
    release.notify_one();
    let first = first.await;

    // then
    assert_eq!(
        second,
        Some(SpinAttemptResult::Rejected(RejectReason::SpinInFlight))
    );
    assert_eq!(
        first,
        SpinAttemptResult::NoOutcomeEvent {
            transaction_hash: FakeSpinContract::TX_HASH
        }
    );
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert!(!client.is_spinning());
}

#[tokio::test]
async fn spin__can_spin_again_after_settling() {
    let contract = FakeSpinContract::new().with_free_spins(5);
    let sent = contract.sent_spins();
    let (client, _) = connected_client(contract);
    client.connect().await.unwrap();

    let first = client.spin().await;
    let second = client.spin().await;

    assert!(matches!(first, SpinAttemptResult::NoOutcomeEvent { .. }));
    assert!(matches!(second, SpinAttemptResult::NoOutcomeEvent { .. }));
    assert_eq!(sent.lock().unwrap().len(), 2);
}
