//! Wallet managers against mock chain nodes.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal_macros::dec;
use serde_json::json;

use cardwallet_core::blockchain::cosmos::CosmosWalletManager;
use cardwallet_core::blockchain::factory::{self, cosmos_service, solana_service, xrp_service};
use cardwallet_core::blockchain::solana::{associated_token_address, Pubkey, SolanaWalletManager, TokenProgram};
use cardwallet_core::blockchain::xrp::XrpWalletManager;
use cardwallet_core::blockchain::WalletManager;
use cardwallet_core::chain::{Amount, Chain, CosmosChain, SolanaChain, Token, XrpChain};
use cardwallet_core::error::ErrorKind;
use cardwallet_core::network::NetworkError;
use cardwallet_core::pending::PendingTransactionRecord;
use cardwallet_core::transaction::{BuildError, FeeParameters, TransactionIntent};
use cardwallet_core::WalletError;
use common::{dead_address, start_programmable_backend, test_config, url, LocalSigner, RecordedRequest};

type Log = Arc<Mutex<Vec<RecordedRequest>>>;

const COSMOS_SOURCE: &str = "cosmos1hsk6jryyqjfhp5dhc55tc9jtckygx0eph6dd02";
const COSMOS_DESTINATION: &str = "cosmos1v9jxgu33kfsgr5";
const COSMOS_HASH: &str = "D7F0A6A4F3B1E0C2A9E8B7C6D5E4F3A2B1C0D9E8F7A6B5C4D3E2F1A0B9C8D7E6";

fn cosmos_reply(request: &RecordedRequest) -> (u16, String) {
    let path = request.path.as_str();
    let body = if path.starts_with("/cosmos/auth/v1beta1/accounts/") {
        json!({
            "account": {
                "@type": "/cosmos.auth.v1beta1.BaseAccount",
                "address": COSMOS_SOURCE,
                "account_number": "42",
                "sequence": "7"
            }
        })
    } else if path.starts_with("/cosmos/bank/v1beta1/balances/") {
        json!({ "balances": [{ "denom": "uatom", "amount": "1500000" }] })
    } else if path == "/cosmos/tx/v1beta1/simulate" {
        json!({ "gas_info": { "gas_wanted": "0", "gas_used": "80000" } })
    } else if path == "/cosmos/tx/v1beta1/txs" {
        json!({ "tx_response": { "code": 0, "txhash": COSMOS_HASH, "raw_log": "" } })
    } else if path.starts_with("/cosmos/tx/v1beta1/txs/") {
        json!({ "tx_response": { "txhash": COSMOS_HASH, "height": "1024" } })
    } else {
        return (404, json!({ "code": 5, "message": "not found" }).to_string());
    };
    (200, body.to_string())
}

async fn start_cosmos_node(log: Log) -> String {
    let addr = start_programmable_backend(move |request| {
        let log = log.clone();
        async move {
            let reply = cosmos_reply(&request);
            log.lock().unwrap().push(request);
            reply
        }
    })
    .await;
    url(addr)
}

fn cosmos_manager(providers: &[String], signer: &LocalSigner) -> CosmosWalletManager {
    let config = test_config(providers, &[], &[]);
    let network = cosmos_service("Cosmos", &config).unwrap();
    CosmosWalletManager::new(
        CosmosChain::Cosmos { testnet: false },
        COSMOS_SOURCE,
        signer.secp256k1_key(),
        vec![],
        network,
    )
    .unwrap()
}

#[tokio::test]
async fn test_cosmos_update_fee_and_send() {
    let log = Log::default();
    let node = start_cosmos_node(log.clone()).await;
    let signer = LocalSigner::new();
    let manager = cosmos_manager(&[node], &signer);
    let chain = CosmosChain::Cosmos { testnet: false };

    manager.update().await.unwrap();
    assert_eq!(manager.wallet().balances.coin(), Some(dec!(1.5)));

    let amount = Amount::coin(&chain, dec!(0.1));
    let fees = manager.get_fee(&amount, COSMOS_DESTINATION).await.unwrap();
    let values: Vec<_> = fees.iter().map(|f| f.amount.value).collect();
    assert_eq!(values, vec![dec!(0.0016), dec!(0.004), dec!(0.0064)]);
    assert_eq!(fees[1].parameters, Some(FeeParameters::Cosmos { gas: 160_000 }));

    let intent = TransactionIntent::new(amount, fees[1].clone(), COSMOS_SOURCE, COSMOS_DESTINATION);
    let result = manager.send(&intent, &signer).await.unwrap();
    assert_eq!(result.hash, COSMOS_HASH);
    assert_eq!(result.current_provider_host, manager.current_host());
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    assert!(manager.wallet().pending.contains(COSMOS_HASH));

    let broadcast = log
        .lock()
        .unwrap()
        .iter()
        .find(|r| r.method == "POST" && r.path == "/cosmos/tx/v1beta1/txs")
        .cloned()
        .unwrap();
    assert!(broadcast.body["tx_bytes"].as_str().is_some_and(|s| !s.is_empty()));
    assert!(broadcast.body["mode"].is_string());

    // The next sync sees the transaction in a block.
    manager.update().await.unwrap();
    assert!(!manager.wallet().has_pending());
}

#[tokio::test]
async fn test_update_expires_stale_pending_records() {
    let node = start_programmable_backend(|request| async move {
        if request.path.starts_with("/cosmos/tx/v1beta1/txs/") {
            (404, json!({ "code": 5, "message": "tx not found" }).to_string())
        } else {
            cosmos_reply(&request)
        }
    })
    .await;
    let signer = LocalSigner::new();
    let mut config = test_config(&[url(node)], &[], &[]);
    config.cosmos.pending_ttl_secs = 60;
    let chain = CosmosChain::Cosmos { testnet: false };
    let manager = factory::cosmos_manager(chain, COSMOS_SOURCE, signer.secp256k1_key(), vec![], &config).unwrap();

    let record = |hash: &str| {
        PendingTransactionRecord::new(
            hash,
            COSMOS_SOURCE,
            COSMOS_DESTINATION,
            Amount::coin(&chain, dec!(0.1)),
            Amount::coin(&chain, dec!(0.004)),
        )
    };
    let mut stale = record("STALE");
    stale.submitted_at -= 3_600;
    let pending = manager.wallet().pending;
    pending.insert(stale);
    pending.insert(record("FRESH"));

    manager.update().await.unwrap();
    let pending = manager.wallet().pending;
    assert!(!pending.contains("STALE"));
    assert!(pending.contains("FRESH"));
}

#[tokio::test]
async fn test_falls_back_past_dead_provider() {
    let dead = url(dead_address().await);
    let live = start_cosmos_node(Log::default()).await;
    let signer = LocalSigner::new();
    let manager = cosmos_manager(&[dead, live.clone()], &signer);

    manager.update().await.unwrap();
    assert_eq!(manager.wallet().balances.coin(), Some(dec!(1.5)));
    assert!(live.ends_with(&manager.current_host()));
}

#[tokio::test]
async fn test_all_providers_exhausted() {
    let providers = vec![url(dead_address().await), url(dead_address().await)];
    let signer = LocalSigner::new();
    let manager = WalletManager::Cosmos(cosmos_manager(&providers, &signer));
    assert_eq!(manager.chain(), Chain::Cosmos(CosmosChain::Cosmos { testnet: false }));

    let err = manager.update().await.unwrap_err();
    assert!(matches!(
        err,
        WalletError::Network(NetworkError::AllProvidersExhausted { attempts: 2, .. })
    ));
    assert_eq!(err.kind(), ErrorKind::NetworkTransport);
}

#[tokio::test]
async fn test_chain_rejection_is_not_retried() {
    let rejecting = start_programmable_backend(|_| async {
        (404, json!({ "code": 5, "message": "account cosmos1x not found" }).to_string())
    })
    .await;
    let hits = Arc::new(AtomicUsize::new(0));
    let second = {
        let hits = hits.clone();
        start_programmable_backend(move |request| {
            hits.fetch_add(1, Ordering::SeqCst);
            async move { cosmos_reply(&request) }
        })
        .await
    };
    let signer = LocalSigner::new();
    let manager = cosmos_manager(&[url(rejecting), url(second)], &signer);

    let err = manager.update().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainProtocol);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

const XRP_ACCOUNT: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
const XRP_ISSUER: &str = "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe";
const XRP_DESTINATION: &str = "rrrrrrrrrrrrrrrrrrrrrhoLvTp";

fn usd() -> Token {
    Token::new("US Dollar", "USD", format!("USD.{XRP_ISSUER}"), 15)
}

fn xrp_reply(request: &RecordedRequest, no_ripple: bool, sequence: u32) -> (u16, String) {
    let result = match request.rpc_method() {
        "account_info" => json!({
            "account_data": { "Account": XRP_ACCOUNT, "Balance": "50000000", "Sequence": sequence, "OwnerCount": 1 },
            "ledger_current_index": 1000,
            "status": "success"
        }),
        "account_lines" => json!({
            "lines": [{
                "account": XRP_ISSUER,
                "currency": "USD",
                "balance": "12.5",
                "limit": "1000",
                "no_ripple": no_ripple
            }],
            "status": "success"
        }),
        "server_state" => json!({
            "state": { "validated_ledger": { "reserve_base": 10_000_000, "reserve_inc": 2_000_000 } },
            "status": "success"
        }),
        "fee" => json!({
            "drops": { "minimum_fee": "10", "open_ledger_fee": "12", "median_fee": "5000" },
            "status": "success"
        }),
        "submit" => json!({ "engine_result": "tesSUCCESS", "status": "success" }),
        _ => json!({ "status": "error", "error": "unknownCmd" }),
    };
    (200, json!({ "result": result }).to_string())
}

async fn xrp_manager(no_ripple: bool, log: Log, signer: &LocalSigner) -> XrpWalletManager {
    xrp_manager_at_sequence(10, no_ripple, log, signer).await
}

async fn xrp_manager_at_sequence(sequence: u32, no_ripple: bool, log: Log, signer: &LocalSigner) -> XrpWalletManager {
    let addr = start_programmable_backend(move |request| {
        let log = log.clone();
        async move {
            let reply = xrp_reply(&request, no_ripple, sequence);
            log.lock().unwrap().push(request);
            reply
        }
    })
    .await;
    let config = test_config(&[], &[], &[url(addr)]);
    let network = xrp_service("XRP Ledger", &config).unwrap();
    XrpWalletManager::new(XRP_ACCOUNT, signer.secp256k1_key(), vec![usd()], network).unwrap()
}

fn submits(log: &Log) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|r| r.rpc_method() == "submit")
        .count()
}

#[tokio::test]
async fn test_xrp_rippling_line_doubles_fee_and_submits_trust_set() {
    let log = Log::default();
    let signer = LocalSigner::new();
    let manager = xrp_manager(false, log.clone(), &signer).await;

    manager.update().await.unwrap();
    let wallet = manager.wallet();
    assert_eq!(wallet.balances.coin(), Some(dec!(50)));
    assert_eq!(wallet.balances.token(&usd()), Some(dec!(12.5)));
    assert!(manager.requires_no_ripple_update(&usd()));

    let coin_fees = manager
        .get_fee(&Amount::coin(&XrpChain, dec!(1)), XRP_DESTINATION)
        .await
        .unwrap();
    let values: Vec<_> = coin_fees.iter().map(|f| f.amount.value).collect();
    assert_eq!(values, vec![dec!(0.00001), dec!(0.000012), dec!(0.005)]);

    let amount = Amount::token(usd(), dec!(5));
    let token_fees = manager.get_fee(&amount, XRP_DESTINATION).await.unwrap();
    let values: Vec<_> = token_fees.iter().map(|f| f.amount.value).collect();
    assert_eq!(values, vec![dec!(0.00002), dec!(0.000024), dec!(0.01)]);

    let intent = TransactionIntent::new(amount, token_fees[1].clone(), XRP_ACCOUNT, XRP_DESTINATION);
    let result = manager.send(&intent, &signer).await.unwrap();
    assert_eq!(result.hash.len(), 64);
    assert_eq!(submits(&log), 2);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
    assert!(manager.is_trustline_operation_in_progress());
    assert!(manager.wallet().pending.contains(&result.hash));
}

#[tokio::test]
async fn test_xrp_settled_line_sends_payment_only() {
    let log = Log::default();
    let signer = LocalSigner::new();
    let manager = xrp_manager(true, log.clone(), &signer).await;

    manager.update().await.unwrap();
    assert!(!manager.requires_no_ripple_update(&usd()));

    let amount = Amount::token(usd(), dec!(5));
    let fees = manager.get_fee(&amount, XRP_DESTINATION).await.unwrap();
    assert_eq!(fees[0].amount.value, dec!(0.00001));

    let intent = TransactionIntent::new(amount, fees[0].clone(), XRP_ACCOUNT, XRP_DESTINATION);
    manager.send(&intent, &signer).await.unwrap();
    assert_eq!(submits(&log), 1);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_xrp_trust_set_at_last_sequence_is_rejected() {
    let log = Log::default();
    let signer = LocalSigner::new();
    let manager = xrp_manager_at_sequence(u32::MAX, false, log.clone(), &signer).await;
    manager.update().await.unwrap();

    let amount = Amount::token(usd(), dec!(5));
    let fees = manager.get_fee(&amount, XRP_DESTINATION).await.unwrap();
    let intent = TransactionIntent::new(amount, fees[0].clone(), XRP_ACCOUNT, XRP_DESTINATION);
    let err = manager.send(&intent, &signer).await.unwrap_err();
    assert!(matches!(err, WalletError::Build(BuildError::AmountOverflow(_))));
    assert_eq!(submits(&log), 0);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
}

/// Mainnet rent: 6960 lamports per byte, including 128 bytes of account overhead.
fn rent_for(body: &serde_json::Value) -> u64 {
    let space = body.pointer("/params/0").and_then(serde_json::Value::as_u64).unwrap_or(0);
    (space + 128) * 6960
}

fn solana_reply(request: &RecordedRequest, destination_exists: bool) -> (u16, String) {
    let result = match request.rpc_method() {
        "getAccountInfo" if destination_exists => json!({
            "context": { "slot": 1 },
            "value": {
                "lamports": 1_000_000,
                "owner": "11111111111111111111111111111111",
                "data": ["", "base64"],
                "executable": false,
                "rentEpoch": 0
            }
        }),
        "getAccountInfo" => json!({ "context": { "slot": 1 }, "value": null }),
        "getLatestBlockhash" => json!({
            "context": { "slot": 1 },
            "value": { "blockhash": "11111111111111111111111111111111", "lastValidBlockHeight": 100 }
        }),
        "getFeeForMessage" => json!({ "context": { "slot": 1 }, "value": 5000 }),
        "getMinimumBalanceForRentExemption" => json!(rent_for(&request.body)),
        _ => {
            let error = json!({ "code": -32601, "message": "Method not found" });
            return (200, json!({ "jsonrpc": "2.0", "id": 1, "error": error }).to_string());
        }
    };
    (200, json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
}

async fn solana_manager(destination_exists: bool, signer: &LocalSigner) -> SolanaWalletManager {
    let addr = start_programmable_backend(move |request| async move {
        solana_reply(&request, destination_exists)
    })
    .await;
    let config = test_config(&[], &[url(addr)], &[]);
    let network = solana_service("Solana", &config).unwrap();
    let key = signer.ed25519_key();
    let address = bs58::encode(&key.key).into_string();
    SolanaWalletManager::new(SolanaChain { testnet: false }, address, key, vec![], network).unwrap()
}

#[tokio::test]
async fn test_solana_fee_for_existing_destination() {
    let signer = LocalSigner::new();
    let manager = solana_manager(true, &signer).await;
    let destination = bs58::encode([7u8; 32]).into_string();

    let amount = Amount::coin(&SolanaChain { testnet: false }, dec!(0.5));
    let fees = manager.get_fee(&amount, &destination).await.unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].amount.value, dec!(0.000005));
    assert_eq!(
        fees[0].parameters,
        Some(FeeParameters::Solana {
            compute_unit_limit: 200_000,
            compute_unit_price: 1_000_000,
            destination_account_exists: true,
        })
    );
}

#[tokio::test]
async fn test_solana_fee_for_new_destination() {
    let signer = LocalSigner::new();
    let manager = solana_manager(false, &signer).await;
    let destination = bs58::encode([9u8; 32]).into_string();

    let amount = Amount::coin(&SolanaChain { testnet: false }, dec!(0.5));
    let fees = manager.get_fee(&amount, &destination).await.unwrap();
    assert_eq!(
        fees[0].parameters,
        Some(FeeParameters::Solana {
            compute_unit_limit: 400_000,
            compute_unit_price: 500_000,
            destination_account_exists: false,
        })
    );
    // Rent is only added when a token account must be created.
    assert_eq!(fees[0].amount.value, dec!(0.000005));
}

#[tokio::test]
async fn test_solana_coin_to_new_account_must_cover_rent() {
    let signer = LocalSigner::new();
    let manager = solana_manager(false, &signer).await;
    let chain = SolanaChain { testnet: false };
    let destination = bs58::encode([9u8; 32]).into_string();

    let amount = Amount::coin(&chain, dec!(0.0005));
    let fees = manager.get_fee(&amount, &destination).await.unwrap();
    let intent = TransactionIntent::new(amount, fees[0].clone(), manager.wallet().address, destination.as_str());
    let err = manager.send(&intent, &signer).await.unwrap_err();
    assert!(matches!(
        &err,
        WalletError::Build(BuildError::BelowRentExemption { minimum }) if *minimum == dec!(0.00089088)
    ));
    assert_eq!(err.kind(), ErrorKind::Build);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);

    let enough = Amount::coin(&chain, dec!(0.001));
    manager
        .validate_destination_for_rent_exemption(&enough, &fees[0])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_solana_coin_to_existing_account_skips_rent_check() {
    let signer = LocalSigner::new();
    let manager = solana_manager(true, &signer).await;
    let destination = bs58::encode([7u8; 32]).into_string();

    let amount = Amount::coin(&SolanaChain { testnet: false }, dec!(0.0000001));
    let fees = manager.get_fee(&amount, &destination).await.unwrap();
    manager
        .validate_destination_for_rent_exemption(&amount, &fees[0])
        .await
        .unwrap();
}

fn token_2022_mint() -> String {
    bs58::encode([0x20u8; 32]).into_string()
}

fn token_2022_reply(request: &RecordedRequest) -> (u16, String) {
    let params = request.body.get("params").cloned().unwrap_or_default();
    let result = match request.rpc_method() {
        "getBalance" => json!({ "context": { "slot": 1 }, "value": 2_000_000_000u64 }),
        "getTokenAccountsByOwner" if params.pointer("/1/programId") == Some(&json!(TokenProgram::Token2022.id())) => {
            json!({
                "context": { "slot": 1 },
                "value": [{
                    "pubkey": bs58::encode([0x21u8; 32]).into_string(),
                    "account": {
                        "lamports": 2_157_600,
                        "owner": TokenProgram::Token2022.id(),
                        "space": 182,
                        "data": {
                            "program": "spl-token-2022",
                            "parsed": {
                                "type": "account",
                                "info": {
                                    "mint": token_2022_mint(),
                                    "tokenAmount": { "amount": "1250000", "decimals": 6 }
                                }
                            },
                            "space": 182
                        }
                    }
                }]
            })
        }
        "getTokenAccountsByOwner" => json!({ "context": { "slot": 1 }, "value": [] }),
        "getAccountInfo" if params.pointer("/0") == Some(&json!(token_2022_mint())) => json!({
            "context": { "slot": 1 },
            "value": {
                "lamports": 1_461_600,
                "owner": TokenProgram::Token2022.id(),
                "data": ["", "base64"],
                "executable": false,
                "rentEpoch": 0
            }
        }),
        "getAccountInfo" => json!({ "context": { "slot": 1 }, "value": null }),
        "getMinimumBalanceForRentExemption" => json!(rent_for(&request.body)),
        "getLatestBlockhash" => json!({
            "context": { "slot": 1 },
            "value": { "blockhash": "11111111111111111111111111111111", "lastValidBlockHeight": 100 }
        }),
        "getFeeForMessage" => json!({ "context": { "slot": 1 }, "value": 5000 }),
        _ => {
            let error = json!({ "code": -32601, "message": "Method not found" });
            return (200, json!({ "jsonrpc": "2.0", "id": 1, "error": error }).to_string());
        }
    };
    (200, json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
}

#[tokio::test]
async fn test_solana_token_2022_balance_and_fee() {
    let log = Log::default();
    let addr = {
        let log = log.clone();
        start_programmable_backend(move |request| {
            let log = log.clone();
            async move {
                let reply = token_2022_reply(&request);
                log.lock().unwrap().push(request);
                reply
            }
        })
        .await
    };
    let config = test_config(&[], &[url(addr)], &[]);
    let network = solana_service("Solana", &config).unwrap();
    let signer = LocalSigner::new();
    let key = signer.ed25519_key();
    let address = bs58::encode(&key.key).into_string();
    let token = Token::new("Paypal USD", "PYUSD", token_2022_mint(), 6);
    let manager =
        SolanaWalletManager::new(SolanaChain { testnet: false }, address, key, vec![token.clone()], network).unwrap();

    let destination = bs58::encode([9u8; 32]).into_string();
    let expected_account = associated_token_address(
        &Pubkey::from_base58(&destination).unwrap(),
        &Pubkey::from_base58(&token_2022_mint()).unwrap(),
        TokenProgram::Token2022,
    )
    .unwrap()
    .to_base58();
    let amount = Amount::token(token.clone(), dec!(1));

    // Before any sync the mint owner decides the program and the base account size is used.
    let fees = manager.get_fee(&amount, &destination).await.unwrap();
    assert_eq!(fees[0].amount.value, dec!(0.00207908));
    let looked_up: Vec<_> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.rpc_method() == "getAccountInfo")
        .filter_map(|r| r.body.pointer("/params/0").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(looked_up, vec![token_2022_mint(), expected_account]);

    manager.update().await.unwrap();
    assert_eq!(manager.wallet().balances.token(&token), Some(dec!(1.25)));

    // After a sync the owner's own account size prices the new account.
    let fees = manager.get_fee(&amount, &destination).await.unwrap();
    assert_eq!(fees[0].amount.value, dec!(0.0021626));
    assert_eq!(
        fees[0].parameters,
        Some(FeeParameters::Solana {
            compute_unit_limit: 400_000,
            compute_unit_price: 500_000,
            destination_account_exists: false,
        })
    );
}
