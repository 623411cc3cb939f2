use carteira::{
    fund,
    position::replay::{replay, PnlKind, ReplayGate},
    position::{PositionKind, PositionSource},
    store::{
        memory::InMemoryStore, AccountStore, AssetStore, CashFlowStore, FundShareStore,
        PositionStore, RealizedTradeStore, TransactionStore,
    },
    CarteiraConfig,
};
use carteira_instrument::{
    account::{Account, AccountKind},
    asset::Asset,
    currency::Currency,
    ticker::Ticker,
    AccountId, AssetId, CashFlowId, FundShareId, TransactionId, UserId,
};
use carteira_market::{
    fx::ExchangeRate,
    quote::Quote,
    store::{QuoteStore, RateStore},
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use smol_str::SmolStr;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

async fn setup_account(store: &InMemoryStore, currency: Currency, name: &str) -> (UserId, AccountId) {
    let user_id = UserId::random();
    let account_id = AccountId::random();
    store
        .insert_account(Account::new(
            account_id,
            user_id,
            name.to_string(),
            AccountKind::BtgBr,
            currency,
            true,
            Utc::now(),
        ))
        .await
        .unwrap();
    (user_id, account_id)
}

async fn setup_account_for_user(
    store: &InMemoryStore,
    user_id: UserId,
    currency: Currency,
    name: &str,
) -> AccountId {
    let account_id = AccountId::random();
    store
        .insert_account(Account::new(
            account_id,
            user_id,
            name.to_string(),
            AccountKind::BtgBr,
            currency,
            true,
            Utc::now(),
        ))
        .await
        .unwrap();
    account_id
}

async fn setup_asset(store: &InMemoryStore, ticker: &str) -> AssetId {
    let asset = Asset::from_ticker(Ticker::new(ticker));
    let asset_id = asset.id;
    store.upsert_asset(asset).await.unwrap();
    asset_id
}

fn transaction(
    account_id: AccountId,
    asset_id: AssetId,
    kind: carteira::ledger::TransactionKind,
    quantity: Decimal,
    price: Decimal,
    fees: Decimal,
    executed_at: DateTime<Utc>,
) -> carteira::ledger::Transaction {
    carteira::ledger::Transaction {
        id: TransactionId::random(),
        account_id,
        asset_id,
        document_id: None,
        kind,
        quantity,
        price,
        fees,
        currency: Currency::BRL,
        exchange_rate: Decimal::ONE,
        executed_at,
        notes: None,
    }
}

fn quote(asset_id: AssetId, day: NaiveDate, close: Decimal) -> Quote {
    Quote::new(
        asset_id,
        day,
        None,
        None,
        None,
        close,
        None,
        None,
        SmolStr::new_static("test"),
    )
}

// Scenario: simple long round-trip. BUY 100 @ 10.00, SELL 100 @ 12.00 fees 1.00.
#[tokio::test]
async fn test_simple_long_round_trip() {
    use carteira::ledger::TransactionKind;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Buy,
            dec!(100),
            dec!(10.00),
            dec!(0),
            at(2024, 1, 2),
        ))
        .await
        .unwrap();
    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Sell,
            dec!(100),
            dec!(12.00),
            dec!(1.00),
            at(2024, 2, 1),
        ))
        .await
        .unwrap();

    let outcome = replay(&store, account_id, asset_id).await.unwrap();

    assert!(outcome.position.is_none());
    assert_eq!(outcome.entries.len(), 1);

    let close = &outcome.entries[0];
    assert_eq!(close.kind, PnlKind::LongClose);
    assert_eq!(close.quantity, dec!(100));
    assert_eq!(close.avg_open_price, dec!(10.00));
    assert_eq!(close.close_price, dec!(12.00));
    assert_eq!(close.gross_proceeds, dec!(1200.00));
    assert_eq!(close.cost_basis, dec!(1000.00));
    assert_eq!(close.realized_pnl, dec!(199.00));
    assert_eq!(close.fees, dec!(1.00));

    // The closing fill was persisted as a realized trade
    let trades = store.realized_trades_for_account(account_id).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].realized_pnl, dec!(199.00));
    assert_eq!(trades[0].close_date, date(2024, 2, 1));
}

// Scenario: flip long -> short. BUY 10 @ 50.00, SELL 15 @ 60.00 fees 3.00.
#[tokio::test]
async fn test_flip_long_to_short() {
    use carteira::ledger::TransactionKind;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "VALE3").await;

    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Buy,
            dec!(10),
            dec!(50.00),
            dec!(0),
            at(2024, 1, 2),
        ))
        .await
        .unwrap();
    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Sell,
            dec!(15),
            dec!(60.00),
            dec!(3.00),
            at(2024, 1, 10),
        ))
        .await
        .unwrap();

    let outcome = replay(&store, account_id, asset_id).await.unwrap();

    assert_eq!(outcome.entries.len(), 1);
    let close = &outcome.entries[0];
    assert_eq!(close.kind, PnlKind::LongClose);
    assert_eq!(close.quantity, dec!(10));
    assert_eq!(close.fees, dec!(2.00)); // 3 * 10/15
    assert_eq!(close.gross_proceeds, dec!(600.00));
    assert_eq!(close.cost_basis, dec!(500.00));
    assert_eq!(close.realized_pnl, dec!(98.00));

    let position = outcome.position.unwrap();
    assert_eq!(position.kind, PositionKind::Short);
    assert_eq!(position.quantity, dec!(5));
    assert_eq!(position.total_cost, dec!(300.00));
    assert_eq!(position.avg_price, dec!(60.00));
    assert_eq!(position.source, PositionSource::Calculated);
}

// Scenario: short close with profit. SELL 10 @ 100.00 opens SHORT, BUY 4 @ 90.00 covers.
#[tokio::test]
async fn test_short_close_with_profit() {
    use carteira::ledger::TransactionKind;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "BBAS3").await;

    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Sell,
            dec!(10),
            dec!(100.00),
            dec!(0),
            at(2024, 1, 2),
        ))
        .await
        .unwrap();
    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Buy,
            dec!(4),
            dec!(90.00),
            dec!(0),
            at(2024, 1, 9),
        ))
        .await
        .unwrap();

    let outcome = replay(&store, account_id, asset_id).await.unwrap();

    assert_eq!(outcome.entries.len(), 1);
    let close = &outcome.entries[0];
    assert_eq!(close.kind, PnlKind::ShortClose);
    assert_eq!(close.quantity, dec!(4));
    assert_eq!(close.gross_proceeds, dec!(400.00));
    assert_eq!(close.cost_basis, dec!(360.00));
    assert_eq!(close.realized_pnl, dec!(40.00));

    let position = outcome.position.unwrap();
    assert_eq!(position.kind, PositionKind::Short);
    assert_eq!(position.quantity, dec!(6));
    assert_eq!(position.total_cost, dec!(600.00));
}

// Scenario: split of a long. BUY 100 @ 20.00, SPLIT factor 2.
#[tokio::test]
async fn test_split_of_long() {
    use carteira::ledger::TransactionKind;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "MGLU3").await;

    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Buy,
            dec!(100),
            dec!(20.00),
            dec!(0),
            at(2024, 1, 2),
        ))
        .await
        .unwrap();
    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Split,
            dec!(2),
            dec!(0),
            dec!(0),
            at(2024, 1, 15),
        ))
        .await
        .unwrap();

    let outcome = replay(&store, account_id, asset_id).await.unwrap();

    assert!(outcome.entries.is_empty());
    let position = outcome.position.unwrap();
    assert_eq!(position.kind, PositionKind::Long);
    assert_eq!(position.quantity, dec!(200));
    assert_eq!(position.total_cost, dec!(2000.00));
    assert_eq!(position.avg_price, dec!(10.00));
}

// Replay is a pure function of the transaction set: a second run yields an identical
// position and no duplicate realized trades.
#[tokio::test]
async fn test_replay_idempotence() {
    use carteira::ledger::TransactionKind;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "ITUB4").await;

    for (kind, quantity, price, fees, executed_at) in [
        (TransactionKind::Buy, dec!(100), dec!(30.00), dec!(1.00), at(2024, 1, 2)),
        (TransactionKind::Sell, dec!(40), dec!(33.00), dec!(0.50), at(2024, 1, 9)),
        (TransactionKind::Buy, dec!(20), dec!(31.00), dec!(0.20), at(2024, 1, 16)),
    ] {
        store
            .insert_transaction(transaction(
                account_id, asset_id, kind, quantity, price, fees, executed_at,
            ))
            .await
            .unwrap();
    }

    let first = replay(&store, account_id, asset_id).await.unwrap();
    let second = replay(&store, account_id, asset_id).await.unwrap();

    let first_position = first.position.unwrap();
    let second_position = second.position.unwrap();
    assert_eq!(first_position.kind, second_position.kind);
    assert_eq!(first_position.quantity, second_position.quantity);
    assert_eq!(first_position.avg_price, second_position.avg_price);
    assert_eq!(first_position.total_cost, second_position.total_cost);
    assert_eq!(first.entries, second.entries);

    // Netting uniqueness: exactly one position row for the pair
    let positions = store.positions_for_account(account_id).await.unwrap();
    assert_eq!(positions.len(), 1);

    // Trade rows keyed by close data are not duplicated
    let trades = store.realized_trades_for_account(account_id).await.unwrap();
    assert_eq!(trades.len(), 1);
}

// A statement-sourced position anchors replay: earlier transactions are not rewound over.
#[tokio::test]
async fn test_statement_anchor_seeds_replay() {
    use carteira::ledger::TransactionKind;
    use carteira::position::Position;
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "WEGE3").await;

    // A pre-statement transaction that must not be replayed
    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Buy,
            dec!(1000),
            dec!(5.00),
            dec!(0),
            at(2023, 12, 1),
        ))
        .await
        .unwrap();

    // Statement says: 100 units at 40.00 as of 2024-01-31
    store
        .upsert_position(Position {
            id: PositionId::random(),
            account_id,
            asset_id,
            kind: PositionKind::Long,
            quantity: dec!(100),
            avg_price: dec!(40.00),
            total_cost: dec!(4000.00),
            source: PositionSource::Statement,
            opened_at: None,
            updated_at: at(2024, 1, 31),
        })
        .await
        .unwrap();

    // Post-statement sale realizes against the statement's average price
    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Sell,
            dec!(50),
            dec!(44.00),
            dec!(0),
            at(2024, 2, 15),
        ))
        .await
        .unwrap();

    let outcome = replay(&store, account_id, asset_id).await.unwrap();

    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(outcome.entries[0].avg_open_price, dec!(40.00));
    assert_eq!(outcome.entries[0].realized_pnl, dec!(200.00));

    let position = outcome.position.unwrap();
    assert_eq!(position.quantity, dec!(50));
    assert_eq!(position.avg_price, dec!(40.00));
}

// Scenario: NAV with FX. 100 units @ BRL 10 + 50 units @ USD 2, USD->BRL = 5.
#[tokio::test]
async fn test_nav_with_fx() {
    use carteira::position::Position;
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let brl_account = setup_account_for_user(&store, user_id, Currency::BRL, "brl").await;
    let usd_account = setup_account_for_user(&store, user_id, Currency::USD, "usd").await;

    let brl_asset = setup_asset(&store, "PETR4").await;
    let usd_asset_obj = {
        let mut asset = Asset::from_ticker(Ticker::new("AAPL"));
        asset.currency = Currency::USD;
        asset
    };
    let usd_asset = usd_asset_obj.id;
    store.upsert_asset(usd_asset_obj).await.unwrap();

    let target = date(2024, 3, 1);
    store.upsert_quote(quote(brl_asset, target, dec!(10.00))).await.unwrap();
    store.upsert_quote(quote(usd_asset, target, dec!(2.00))).await.unwrap();
    store
        .upsert_rate(ExchangeRate::new(
            target,
            Currency::USD,
            Currency::BRL,
            dec!(5.00),
            SmolStr::new_static("test"),
        ))
        .await
        .unwrap();

    for (account_id, asset_id, quantity, avg_price) in [
        (brl_account, brl_asset, dec!(100), dec!(10.00)),
        (usd_account, usd_asset, dec!(50), dec!(2.00)),
    ] {
        store
            .upsert_position(Position {
                id: PositionId::random(),
                account_id,
                asset_id,
                kind: PositionKind::Long,
                quantity,
                avg_price,
                total_cost: quantity * avg_price,
                source: PositionSource::Calculated,
                opened_at: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let result = fund::nav(&store, &config, user_id, target, true).await.unwrap();

    assert_eq!(result.positions_count, 2);
    assert_eq!(result.positions_with_prices, 2);
    // 1000 BRL + 100 USD * 5.00
    assert_eq!(result.nav_base, dec!(1500.00));
    assert_eq!(result.ptax_rate, Some(dec!(5.00)));
}

// NAV identity: with no flows and unchanged prices, NAV(d) = NAV(d-1).
#[tokio::test]
async fn test_nav_identity_across_quiet_days() {
    use carteira::position::Position;
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let account_id = setup_account_for_user(&store, user_id, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    store
        .upsert_quote(quote(asset_id, date(2024, 3, 1), dec!(36.50)))
        .await
        .unwrap();
    store
        .upsert_position(Position {
            id: PositionId::random(),
            account_id,
            asset_id,
            kind: PositionKind::Long,
            quantity: dec!(100),
            avg_price: dec!(30.00),
            total_cost: dec!(3000.00),
            source: PositionSource::Calculated,
            opened_at: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let friday = fund::nav(&store, &config, user_id, date(2024, 3, 1), true).await.unwrap();
    let saturday = fund::nav(&store, &config, user_id, date(2024, 3, 2), true).await.unwrap();

    // At-date price lookup walks back to the last close; nothing changed in between
    assert_eq!(friday.nav_base, saturday.nav_base);
}

// Scenario: share issuance. Previous share value 120.00, deposit 12000.00 -> +100 shares.
#[tokio::test]
async fn test_share_issuance() {
    use carteira::fund::FundShare;
    use carteira::ledger::{CashFlow, CashFlowKind};

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let account_id = setup_account_for_user(&store, user_id, Currency::BRL, "main").await;

    store
        .upsert_fund_share(FundShare {
            id: FundShareId::random(),
            user_id,
            date: date(2024, 2, 29),
            nav: dec!(24000.00),
            shares_outstanding: dec!(200),
            share_value: dec!(120.00),
            daily_return: None,
            cumulative_return: Some(dec!(0.2)),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let flow_id = CashFlowId::random();
    store
        .insert_cash_flow(CashFlow {
            id: flow_id,
            account_id,
            kind: CashFlowKind::Deposit,
            amount: dec!(12000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 3, 1),
            shares_affected: None,
            notes: None,
        })
        .await
        .unwrap();

    let result = fund::issue_shares(&store, &config, user_id, flow_id, dec!(12000.00), date(2024, 3, 1))
        .await
        .unwrap();

    assert_eq!(result.share_value, dec!(120.00));
    assert_eq!(result.shares_affected, dec!(100.00000000));

    let flow = store.cash_flow(flow_id).await.unwrap();
    assert_eq!(flow.shares_affected, Some(dec!(100.00000000)));

    // Quota monotonicity: outstanding moved by exactly the shares issued
    let outstanding = fund::shares_outstanding(&store, user_id, date(2024, 3, 1)).await.unwrap();
    assert_eq!(outstanding, dec!(100.00000000));
}

// Redemption beyond the outstanding shares is rejected.
#[tokio::test]
async fn test_redeem_insufficient_shares() {
    use carteira::ledger::{CashFlow, CashFlowKind};
    use carteira::CarteiraError;

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let account_id = setup_account_for_user(&store, user_id, Currency::BRL, "main").await;

    // Deposit issuing 100 shares at the initial value
    let deposit_id = CashFlowId::random();
    store
        .insert_cash_flow(CashFlow {
            id: deposit_id,
            account_id,
            kind: CashFlowKind::Deposit,
            amount: dec!(10000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 1, 2),
            shares_affected: None,
            notes: None,
        })
        .await
        .unwrap();
    fund::issue_shares(&store, &config, user_id, deposit_id, dec!(10000.00), date(2024, 1, 2))
        .await
        .unwrap();

    let withdrawal_id = CashFlowId::random();
    store
        .insert_cash_flow(CashFlow {
            id: withdrawal_id,
            account_id,
            kind: CashFlowKind::Withdrawal,
            amount: dec!(50000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 1, 10),
            shares_affected: None,
            notes: None,
        })
        .await
        .unwrap();

    let result = fund::redeem_shares(
        &store,
        &config,
        user_id,
        withdrawal_id,
        dec!(50000.00),
        date(2024, 1, 10),
    )
    .await;

    assert!(matches!(result, Err(CarteiraError::InsufficientShares { .. })));
}

// With no share-bearing flows every valuation bootstraps shares outstanding, so the first
// investor's share value is pinned at exactly the initial value.
#[tokio::test]
async fn test_daily_fund_share_bootstrap_without_flows() {
    use carteira::position::Position;
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let account_id = setup_account_for_user(&store, user_id, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    store
        .upsert_position(Position {
            id: PositionId::random(),
            account_id,
            asset_id,
            kind: PositionKind::Long,
            quantity: dec!(100),
            avg_price: dec!(30.00),
            total_cost: dec!(3000.00),
            source: PositionSource::Calculated,
            opened_at: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .upsert_quote(quote(asset_id, date(2024, 3, 1), dec!(30.00)))
        .await
        .unwrap();

    let first = fund::create_daily_fund_share(&store, &config, user_id, date(2024, 3, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.nav, dec!(3000.00));
    assert_eq!(first.shares_outstanding, dec!(30));
    assert_eq!(first.share_value, dec!(100));
    assert_eq!(first.cumulative_return, Some(dec!(0)));
    assert_eq!(first.daily_return, None);
}

// Daily fund share against recorded flows: returns move with the NAV, and the upsert is
// idempotent.
#[tokio::test]
async fn test_daily_fund_share_lifecycle() {
    use carteira::ledger::{CashFlow, CashFlowKind};
    use carteira::position::Position;
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let account_id = setup_account_for_user(&store, user_id, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    // The portfolio was funded by a recorded deposit: 3000 at the initial share value
    let deposit_id = CashFlowId::random();
    store
        .insert_cash_flow(CashFlow {
            id: deposit_id,
            account_id,
            kind: CashFlowKind::Deposit,
            amount: dec!(3000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 2, 28),
            shares_affected: None,
            notes: None,
        })
        .await
        .unwrap();
    fund::issue_shares(&store, &config, user_id, deposit_id, dec!(3000.00), date(2024, 2, 28))
        .await
        .unwrap();

    // The cash was invested: 100 units at 30.00, leaving no idle balance behind the position
    store
        .upsert_position(Position {
            id: PositionId::random(),
            account_id,
            asset_id,
            kind: PositionKind::Long,
            quantity: dec!(100),
            avg_price: dec!(30.00),
            total_cost: dec!(3000.00),
            source: PositionSource::Calculated,
            opened_at: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    let buy_id = CashFlowId::random();
    store
        .insert_cash_flow(CashFlow {
            id: buy_id,
            account_id,
            kind: CashFlowKind::Withdrawal,
            amount: dec!(3000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 2, 29),
            shares_affected: None,
            notes: Some("settled into PETR4".to_string()),
        })
        .await
        .unwrap();

    store
        .upsert_quote(quote(asset_id, date(2024, 3, 1), dec!(30.00)))
        .await
        .unwrap();

    // 30 shares outstanding from the deposit; NAV 3000 -> share value 100
    let first = fund::create_daily_fund_share(&store, &config, user_id, date(2024, 3, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.shares_outstanding, dec!(30));
    assert_eq!(first.share_value, dec!(100));

    // Price moves up 2% the next trading day
    store
        .upsert_quote(quote(asset_id, date(2024, 3, 4), dec!(30.60)))
        .await
        .unwrap();
    let second = fund::create_daily_fund_share(&store, &config, user_id, date(2024, 3, 4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.share_value, dec!(102));
    assert_eq!(second.daily_return, Some(dec!(0.02)));
    assert_eq!(second.cumulative_return, Some(dec!(0.02)));

    // Re-running the same date does not change the row
    let again = fund::create_daily_fund_share(&store, &config, user_id, date(2024, 3, 4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.share_value, second.share_value);
    assert_eq!(again.shares_outstanding, second.shares_outstanding);

    let history = store.fund_share_history(user_id, None, None, 10).await.unwrap();
    assert_eq!(history.len(), 2);
}

// Conservation of cost across a mixed long/short sequence that ends flat.
#[tokio::test]
async fn test_conservation_of_cost() {
    use carteira::ledger::TransactionKind;

    let store = InMemoryStore::new();
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "BBDC4").await;

    let script = [
        (TransactionKind::Buy, dec!(100), dec!(14.00), dec!(1.10), at(2024, 1, 2)),
        (TransactionKind::Sell, dec!(150), dec!(15.00), dec!(2.00), at(2024, 1, 9)),
        (TransactionKind::Buy, dec!(50), dec!(13.50), dec!(0.90), at(2024, 1, 16)),
    ];
    for (kind, quantity, price, fees, executed_at) in script {
        store
            .insert_transaction(transaction(
                account_id, asset_id, kind, quantity, price, fees, executed_at,
            ))
            .await
            .unwrap();
    }

    let outcome = replay(&store, account_id, asset_id).await.unwrap();
    assert!(outcome.position.is_none());

    let realized: Decimal = outcome.entries.iter().map(|entry| entry.realized_pnl).sum();
    let sold = dec!(150) * dec!(15.00);
    let bought = dec!(100) * dec!(14.00) + dec!(50) * dec!(13.50);
    let fees = dec!(1.10) + dec!(2.00) + dec!(0.90);
    assert_eq!(realized, sold - bought - fees);
}

// Consolidation aggregates the same asset across accounts with a weighted average price.
#[tokio::test]
async fn test_consolidated_positions_across_accounts() {
    use carteira::position::{consolidated_positions, Position};
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let user_id = UserId::random();
    let first = setup_account_for_user(&store, user_id, Currency::BRL, "btg").await;
    let second = setup_account_for_user(&store, user_id, Currency::BRL, "xp").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    for (account_id, quantity, total_cost) in
        [(first, dec!(100), dec!(3000.00)), (second, dec!(50), dec!(1800.00))]
    {
        store
            .upsert_position(Position {
                id: PositionId::random(),
                account_id,
                asset_id,
                kind: PositionKind::Long,
                quantity,
                avg_price: total_cost / quantity,
                total_cost,
                source: PositionSource::Calculated,
                opened_at: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let consolidated = consolidated_positions(&store, user_id).await.unwrap();
    assert_eq!(consolidated.len(), 1);
    assert_eq!(consolidated[0].total_quantity, dec!(150));
    assert_eq!(consolidated[0].total_cost, dec!(4800.00));
    assert_eq!(consolidated[0].weighted_avg_price, dec!(32.00));
    assert_eq!(consolidated[0].accounts_count, 2);
}

// Backfill walks the date range in order and writes one quota row per valued day.
#[tokio::test]
async fn test_backfill_fund_shares() {
    use carteira::ledger::{CashFlow, CashFlowKind};
    use carteira::position::Position;
    use carteira_instrument::PositionId;

    let store = InMemoryStore::new();
    let config = CarteiraConfig::default();
    let user_id = UserId::random();
    let account_id = setup_account_for_user(&store, user_id, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    // Funded by a recorded deposit whose cash then settled into the position
    let deposit_id = CashFlowId::random();
    store
        .insert_cash_flow(CashFlow {
            id: deposit_id,
            account_id,
            kind: CashFlowKind::Deposit,
            amount: dec!(3000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 3, 28),
            shares_affected: None,
            notes: None,
        })
        .await
        .unwrap();
    fund::issue_shares(&store, &config, user_id, deposit_id, dec!(3000.00), date(2024, 3, 28))
        .await
        .unwrap();
    store
        .insert_cash_flow(CashFlow {
            id: CashFlowId::random(),
            account_id,
            kind: CashFlowKind::Withdrawal,
            amount: dec!(3000.00),
            currency: Currency::BRL,
            exchange_rate: Decimal::ONE,
            executed_at: at(2024, 3, 29),
            shares_affected: None,
            notes: Some("settled into PETR4".to_string()),
        })
        .await
        .unwrap();

    store
        .upsert_position(Position {
            id: PositionId::random(),
            account_id,
            asset_id,
            kind: PositionKind::Long,
            quantity: dec!(100),
            avg_price: dec!(30.00),
            total_cost: dec!(3000.00),
            source: PositionSource::Calculated,
            opened_at: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    for (day, close) in [(1, dec!(30.00)), (2, dec!(30.30)), (3, dec!(30.00))] {
        store
            .upsert_quote(quote(asset_id, date(2024, 4, day), close))
            .await
            .unwrap();
    }

    let written =
        fund::backfill_fund_shares(&store, &config, user_id, date(2024, 4, 1), date(2024, 4, 3))
            .await
            .unwrap();
    assert_eq!(written, 3);

    let history = store.fund_share_history(user_id, None, None, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    // Descending history: day 3 first; its daily return is the day-2 -> day-3 move
    assert_eq!(history[0].date, date(2024, 4, 3));
    assert!(history[0].daily_return.unwrap() < Decimal::ZERO);
    assert!(history[1].daily_return.unwrap() > Decimal::ZERO);
}

// The replay gate serialises concurrent recomputation of one pair.
#[tokio::test]
async fn test_replay_gate_serialises_pair() {
    use carteira::ledger::TransactionKind;
    use std::sync::Arc;

    let store = Arc::new(InMemoryStore::new());
    let gate = Arc::new(ReplayGate::new());
    let (_, account_id) = setup_account(&store, Currency::BRL, "main").await;
    let asset_id = setup_asset(&store, "PETR4").await;

    store
        .insert_transaction(transaction(
            account_id,
            asset_id,
            TransactionKind::Buy,
            dec!(100),
            dec!(10.00),
            dec!(0),
            at(2024, 1, 2),
        ))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move {
            carteira::position::replay::replay_after_change(&*store, &gate, account_id, asset_id)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Netting invariant survived the contention
    let positions = store.positions_for_account(account_id).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].quantity, dec!(100));
}
