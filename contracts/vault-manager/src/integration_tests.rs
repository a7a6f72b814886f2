//! Integration Tests
//!
//! End-to-end flows across the ledger, both queues, the pools and the fee
//! distributor, driven through the public entry points and `Action`s.

use proptest::prelude::*;

use sbr_common::{
    constants::{
        index::NULL_ID,
        precision::{ONE, PRECISION},
    },
    errors::SbrError,
    events::{EventType, LiquidationPath},
    types::{Address, Asset, PositionId, SystemMode},
    FixedPriceFeed, ProtocolConfig,
};

use crate::*;

const ALICE: Address = [1u8; 32];
const BOB: Address = [2u8; 32];
const CAROL: Address = [3u8; 32];
const DAVE: Address = [4u8; 32];
const KEEPER: Address = [9u8; 32];

fn par() -> FixedPriceFeed {
    FixedPriceFeed::new(PRECISION)
}

fn price_pct(pct: u128) -> FixedPriceFeed {
    FixedPriceFeed::new(pct * PRECISION / 100)
}

fn new_ctx() -> ProtocolContext {
    ProtocolContext::new(ProtocolConfig::default()).unwrap()
}

/// Context that leaves Bootstrap on the first borrow
fn normal_mode_ctx() -> ProtocolContext {
    let config = ProtocolConfig {
        bootstrap_debt_threshold: 0,
        ..Default::default()
    };
    ProtocolContext::new(config).unwrap()
}

fn open_with_debt(ctx: &mut ProtocolContext, owner: Address, collateral: u128, debt: u128) -> PositionId {
    let id = ctx.open_position(owner, collateral).unwrap();
    ctx.borrow(owner, id, debt, 0, &par()).unwrap();
    id
}

fn fund_and_stake(ctx: &mut ProtocolContext, depositor: Address, amount: u128) {
    ctx.balances.credit(&depositor, Asset::DebtToken, amount).unwrap();
    ctx.stability_stake(depositor, amount).unwrap();
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_single_position_is_head_and_tail() {
    let mut ctx = new_ctx();
    let id = open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 500 * ONE);

    assert_eq!(ctx.position(id).unwrap().debt, 500 * ONE);
    let queue = ctx.liquidation_index();
    assert_eq!(queue.key_of(id), Some(PRECISION / 2));
    assert_eq!(queue.head(), Some(id));
    assert_eq!(queue.tail(), Some(id));
    assert_eq!(ctx.redemption_index().head(), Some(id));
    ctx.check_invariants().unwrap();
}

#[test]
fn test_riskiest_position_liquidated_first() {
    let mut ctx = new_ctx();
    let a = open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 900 * ONE);
    let b = open_with_debt(&mut ctx, BOB, 1_000 * ONE, 500 * ONE);

    assert_eq!(ctx.liquidation_index().head(), Some(b));
    assert_eq!(ctx.liquidation_index().tail(), Some(a));

    let outcome = ctx.liquidate(KEEPER, &price_pct(95)).unwrap();
    assert_eq!(outcome.id, a);
    assert_eq!(outcome.path, LiquidationPath::Redistribution);
    assert_eq!(ctx.liquidation_index().tail(), Some(b));

    // B has taken on all of A and is still healthy
    assert_eq!(ctx.position(b).unwrap().debt, 1_400 * ONE);
    assert_eq!(
        ctx.liquidate(KEEPER, &price_pct(95)),
        Err(SbrError::NotLiquidatable { id: b })
    );
    assert_eq!(ctx.accrual.total_debt, 1_400 * ONE);
    ctx.check_invariants().unwrap();
}

#[test]
fn test_stability_pool_halves_on_absorb() {
    let mut ctx = new_ctx();
    let id = open_with_debt(&mut ctx, ALICE, 560 * ONE, 500 * ONE);
    fund_and_stake(&mut ctx, CAROL, 1_000 * ONE);

    let outcome = ctx.liquidate(KEEPER, &price_pct(95)).unwrap();

    assert_eq!(outcome.id, id);
    assert_eq!(outcome.path, LiquidationPath::StabilityPool);
    assert_eq!(ctx.stability_pool.scaling_factor, PRECISION / 2);
    assert_eq!(ctx.stability_pool.total_staked, 500 * ONE);
    assert_eq!(ctx.stability_pool.effective_stake_of(&CAROL).unwrap(), 500 * ONE);

    // seized collateral plus the pool's share of the liquidation fee
    let gains = ctx.stability_pool.pending_gains_of(&CAROL).unwrap();
    let seized = 560 * ONE - outcome.liquidation_fee;
    assert!(gains.collateral >= seized);
    assert!(gains.collateral <= seized + outcome.liquidation_fee);

    let remaining = ctx.stability_unstake(CAROL, 500 * ONE).unwrap();
    assert_eq!(remaining, 0);
    assert_eq!(ctx.balances.balance_of(&CAROL, Asset::Collateral), gains.collateral);
}

#[test]
fn test_redemption_walks_fee_weight_order() {
    let mut ctx = normal_mode_ctx();
    let p1 = open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 100 * ONE);
    let p2 = open_with_debt(&mut ctx, BOB, 1_000 * ONE, 150 * ONE);
    let p3 = open_with_debt(&mut ctx, CAROL, 1_000 * ONE, 200 * ONE);
    ctx.fee_topup(ALICE, p1, ONE).unwrap();
    ctx.fee_topup(BOB, p2, 2 * ONE).unwrap();
    ctx.fee_topup(CAROL, p3, 3 * ONE).unwrap();
    assert_eq!(ctx.accrual.mode, SystemMode::Normal);

    ctx.balances.credit(&DAVE, Asset::DebtToken, 300 * ONE).unwrap();
    let outcome = ctx.redeem(DAVE, 300 * ONE, NULL_ID).unwrap();

    assert_eq!(outcome.fill, RedemptionFill::Full);
    assert_eq!(outcome.positions_touched, 3);
    assert!(ctx.position(p1).is_err());
    assert!(ctx.position(p2).is_err());

    let third = ctx.position(p3).unwrap();
    assert_eq!(third.debt, 150 * ONE);
    assert_eq!(third.collateral, 750 * ONE);
    assert_eq!(ctx.redemption_index().len(), 1);
    assert_eq!(ctx.redemption_index().key_of(p3), Some(3 * ONE));
    assert_eq!(ctx.liquidation_index().key_of(p3), Some(PRECISION / 5));
    assert_eq!(ctx.balances.balance_of(&DAVE, Asset::DebtToken), 0);
    assert_eq!(ctx.events.filter_by_type(EventType::PositionRedeemed).len(), 3);
    ctx.check_invariants().unwrap();
}

#[test]
fn test_fee_split_with_empty_staking_pool() {
    let mut ctx = new_ctx();
    fund_and_stake(&mut ctx, CAROL, 50 * ONE);

    let routing = ctx.distribute_fee(DAVE, FeeAsset::DebtToken, 1_000 * ONE).unwrap();

    assert_eq!(routing.refunded, 100 * ONE);
    assert_eq!(routing.to_stability_pool, 900 * ONE);
    assert_eq!(routing.to_staking_pool, 0);
    assert_eq!(ctx.balances.balance_of(&DAVE, Asset::DebtToken), 100 * ONE);
    assert_eq!(
        ctx.stability_pool.pending_gains_of(&CAROL).unwrap().reward,
        900 * ONE
    );
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_full_position_lifecycle() {
    let mut ctx = new_ctx();
    let id = ctx.open_position(ALICE, 2_000 * ONE).unwrap();
    ctx.borrow(ALICE, id, 1_000 * ONE, 50, &par()).unwrap();
    ctx.add_collateral(ALICE, id, 500 * ONE).unwrap();
    ctx.withdraw_collateral(ALICE, id, 200 * ONE, &par()).unwrap();
    ctx.repay(ALICE, id, 1_000 * ONE).unwrap();
    let returned = ctx.close_position(ALICE, id).unwrap();

    assert_eq!(returned, 2_300 * ONE);
    assert_eq!(ctx.position_count(), 0);
    assert_eq!(ctx.accrual.total_debt, 0);
    assert_eq!(ctx.accrual.total_collateral, 0);
    assert_eq!(ctx.balances.balance_of(&ALICE, Asset::Collateral), 2_500 * ONE);
    // fee refunded in full, repay burned the rest
    assert_eq!(ctx.balances.balance_of(&ALICE, Asset::DebtToken), 0);
}

#[test]
fn test_rejected_operation_leaves_state_untouched() {
    let mut ctx = new_ctx();
    let id = open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 500 * ONE);
    let before = ctx.state_digest().unwrap();

    assert!(ctx.withdraw_collateral(ALICE, id, 600 * ONE, &par()).is_err());
    assert!(ctx.repay(BOB, id, ONE).is_err());
    assert!(ctx.borrow(ALICE, id, 1_000 * ONE, 0, &par()).is_err());
    assert!(ctx.redeem(ALICE, ONE, NULL_ID).is_err());

    assert_eq!(ctx.state_digest().unwrap(), before);
}

#[test]
fn test_sole_position_cannot_be_redistributed() {
    let mut ctx = new_ctx();
    let id = open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 900 * ONE);

    let results = execute_batch(
        &mut ctx,
        &price_pct(90),
        &[Action::Liquidate { liquidator: KEEPER }, Action::AdvanceTo { block: 5 }],
    )
    .unwrap();

    assert_eq!(results[0], Err(SbrError::CannotRedistribute { id }));
    assert_eq!(results[1], Ok(ActionOutcome::Done));
    assert_eq!(ctx.block_height, 5);
    assert!(ctx.position(id).is_ok());
}

#[test]
fn test_dust_survivor_leaves_batch_running() {
    let mut ctx = new_ctx();
    let id = open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 900 * ONE);
    let dust = ctx.open_position(BOB, 1).unwrap();

    let results = execute_batch(
        &mut ctx,
        &price_pct(95),
        &[Action::Liquidate { liquidator: KEEPER }, Action::AdvanceTo { block: 5 }],
    )
    .unwrap();

    assert_eq!(results[0], Err(SbrError::CannotRedistribute { id }));
    assert_eq!(ctx.block_height, 5);
    assert_eq!(ctx.position(dust).unwrap().debt, 0);
    assert_eq!(ctx.liquidation_index().tail(), Some(id));
}

#[test]
fn test_redistributed_position_is_liquidated_before_fresh_one() {
    let mut ctx = new_ctx();
    open_with_debt(&mut ctx, ALICE, 1_000 * ONE, 900 * ONE);
    let b = open_with_debt(&mut ctx, BOB, 1_000 * ONE, 500 * ONE);
    ctx.open_position(CAROL, 1_000 * ONE).unwrap();
    ctx.liquidate(KEEPER, &price_pct(95)).unwrap();
    let d = open_with_debt(&mut ctx, DAVE, 1_000 * ONE, 600 * ONE);

    let results = execute_batch(
        &mut ctx,
        &price_pct(69),
        &[Action::Liquidate { liquidator: KEEPER }, Action::Liquidate { liquidator: KEEPER }],
    )
    .unwrap();

    let ActionOutcome::Liquidated(first) = results[0].clone().unwrap() else {
        panic!("expected a liquidation, got {:?}", results[0]);
    };
    assert_eq!(first.id, b);
    // D absorbs part of B and stays healthy
    assert_eq!(results[1], Err(SbrError::NotLiquidatable { id: d }));
    ctx.check_invariants().unwrap();
}

// ============================================================================
// Batch Execution
// ============================================================================

#[test]
fn test_batch_collects_recoverable_failures() {
    let mut ctx = new_ctx();
    let actions = [
        Action::OpenPosition { owner: ALICE, collateral: 1_000 * ONE },
        Action::Borrow { caller: ALICE, id: 1, amount: ONE, fee_rate_bps: 0 },
        Action::Borrow { caller: ALICE, id: 1, amount: 100 * ONE, fee_rate_bps: 0 },
        Action::AdvanceTo { block: 10 },
    ];

    let results = execute_batch(&mut ctx, &par(), &actions).unwrap();

    assert_eq!(results[0], Ok(ActionOutcome::Opened { id: 1 }));
    assert!(matches!(results[1], Err(SbrError::DebtTooLow { .. })));
    assert_eq!(results[2], Ok(ActionOutcome::Borrowed { fee: 0 }));
    assert_eq!(ctx.position(1).unwrap().debt, 100 * ONE);
    assert_eq!(ctx.block_height, 10);
}

#[test]
fn test_batch_rolls_back_on_fatal_error() {
    let mut ctx = new_ctx();
    ctx.open_position(BOB, ONE).unwrap();
    let before = ctx.state_digest().unwrap();

    let actions = [
        Action::OpenPosition { owner: ALICE, collateral: 1_000 * ONE },
        Action::OpenPosition { owner: ALICE, collateral: u128::MAX },
        Action::AdvanceTo { block: 10 },
    ];
    let result = execute_batch(&mut ctx, &par(), &actions);

    assert_eq!(result, Err(SbrError::Overflow));
    assert_eq!(ctx.state_digest().unwrap(), before);
    assert_eq!(ctx.position_count(), 1);
}

#[test]
fn test_actions_roundtrip_through_borsh() {
    let action = Action::Redeem { redeemer: DAVE, amount: 42 * ONE, hint: 7 };
    let bytes = borsh::to_vec(&action).unwrap();
    let decoded: Action = borsh::from_slice(&bytes).unwrap();
    assert_eq!(decoded, action);
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Open(u8, u128),
    Borrow(usize, u128),
    Repay(usize, u128),
    AddCollateral(usize, u128),
    Stake(u8, u128),
    Liquidate(u128),
    Sync(usize),
}

const OWNERS: [Address; 4] = [ALICE, BOB, CAROL, DAVE];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => (0u8..4, 100u128..5_000).prop_map(|(o, c)| Op::Open(o, c * ONE)),
        3 => (0usize..8, 10u128..3_000).prop_map(|(p, a)| Op::Borrow(p, a * ONE)),
        1 => (0usize..8, 1u128..500).prop_map(|(p, a)| Op::Repay(p, a * ONE)),
        1 => (0usize..8, 1u128..500).prop_map(|(p, a)| Op::AddCollateral(p, a * ONE)),
        1 => (0u8..4, 1u128..1_000).prop_map(|(o, a)| Op::Stake(o, a * ONE)),
        2 => (40u128..120).prop_map(Op::Liquidate),
        1 => (0usize..8).prop_map(Op::Sync),
    ]
}

/// Apply `op`; the returned error, if any, must be recoverable.
fn apply(ctx: &mut ProtocolContext, ids: &mut Vec<PositionId>, op: &Op) -> Result<(), SbrError> {
    let pick = |ids: &Vec<PositionId>, i: usize| ids.get(i % ids.len().max(1)).copied().unwrap_or(NULL_ID);
    let owner_of = |ctx: &ProtocolContext, id: PositionId| ctx.position(id).map(|p| p.owner).unwrap_or(ALICE);

    match *op {
        Op::Open(o, collateral) => ctx.open_position(OWNERS[o as usize], collateral).map(|id| ids.push(id)),
        Op::Borrow(i, amount) => {
            let id = pick(ids, i);
            let owner = owner_of(ctx, id);
            ctx.borrow(owner, id, amount, 0, &par()).map(|_| ())
        }
        Op::Repay(i, amount) => {
            let id = pick(ids, i);
            let owner = owner_of(ctx, id);
            ctx.repay(owner, id, amount)
        }
        Op::AddCollateral(i, amount) => {
            let id = pick(ids, i);
            let owner = owner_of(ctx, id);
            ctx.add_collateral(owner, id, amount)
        }
        Op::Stake(o, amount) => ctx.stability_stake(OWNERS[o as usize], amount).map(|_| ()),
        Op::Liquidate(pct) => ctx.liquidate(KEEPER, &price_pct(pct)).map(|_| ()),
        Op::Sync(i) => ctx.sync_position(pick(ids, i)).map(|_| ()),
    }
}

proptest! {
    #[test]
    fn prop_ledger_totals_match_positions(ops in prop::collection::vec(op(), 1..60)) {
        let mut ctx = new_ctx();
        let mut ids = Vec::new();

        for op in &ops {
            if let Err(err) = apply(&mut ctx, &mut ids, op) {
                prop_assert!(!err.is_fatal(), "fatal error {:?} on {:?}", err, op);
            }
            let debt: u128 = ctx.positions().map(|p| p.debt).sum();
            let collateral: u128 = ctx.positions().map(|p| p.collateral).sum();
            prop_assert_eq!(debt, ctx.accrual.total_debt);
            prop_assert_eq!(collateral, ctx.accrual.total_collateral);
            prop_assert!(ctx.check_invariants().is_ok());
        }

        // once everything is synced only rounding dust stays pending
        let all: Vec<PositionId> = ctx.positions().map(|p| p.id).collect();
        for id in all {
            ctx.sync_position(id).unwrap();
        }
        prop_assert!(ctx.accrual.pending_debt < 1_000_000);
        prop_assert!(ctx.accrual.pending_collateral < 1_000_000);
    }

    #[test]
    fn prop_redistribution_settles_every_position(
        collaterals in prop::collection::vec(100u128..10_000, 2..6),
        debt_pct in 50u128..90,
    ) {
        let mut ctx = new_ctx();
        let victim = open_with_debt(&mut ctx, KEEPER, 1_000 * ONE, 10 * debt_pct * ONE);
        let ids: Vec<PositionId> = collaterals
            .iter()
            .map(|c| ctx.open_position(ALICE, c * ONE).unwrap())
            .collect();

        let outcome = ctx.liquidate(KEEPER, &price_pct(debt_pct)).unwrap();
        prop_assert_eq!(outcome.id, victim);

        for id in ids {
            prop_assert!(ctx.position(id).unwrap().debt > 0);
            prop_assert!(ctx.liquidation_index().contains(id));
            prop_assert!(ctx.sync_position(id).unwrap().is_zero());
        }
        prop_assert!(ctx.check_invariants().is_ok());
    }

    #[test]
    fn prop_tail_is_riskiest_and_collateral_is_kept(ops in prop::collection::vec(op(), 1..60)) {
        let mut ctx = new_ctx();
        let mut ids = Vec::new();
        let mut deposited = 0u128;

        for op in &ops {
            match (apply(&mut ctx, &mut ids, op), op) {
                (Ok(()), Op::Open(_, amount)) | (Ok(()), Op::AddCollateral(_, amount)) => deposited += amount,
                (Err(err), _) => {
                    prop_assert!(!err.is_fatal(), "fatal error {:?} on {:?}", err, op);
                }
                _ => {}
            }

            // ratios once every pending share is applied
            let mut synced = ctx.clone();
            for p in ctx.positions() {
                synced.sync_position(p.id).unwrap();
            }
            let riskiest = synced
                .positions()
                .filter(|p| p.debt > 0)
                .map(|p| p.ratio().unwrap())
                .max();
            let queue = ctx.liquidation_index();
            let tail_key = queue.tail().and_then(|id| queue.key_of(id));
            prop_assert_eq!(tail_key, riskiest, "tail is not the riskiest after {:?}", op);

            // collateral on positions, in flight, paid out or owed to the pool
            let mut accounted = ctx.accrual.pending_collateral;
            for p in ctx.positions() {
                accounted += p.collateral;
            }
            for holder in OWNERS.iter().chain([KEEPER].iter()) {
                accounted += ctx.balances.balance_of(holder, Asset::Collateral);
                accounted += ctx.stability_pool.pending_gains_of(holder).unwrap().collateral;
            }
            let drift = deposited.abs_diff(accounted);
            prop_assert!(drift <= deposited / 1_000_000 + 1_000, "collateral drift {} after {:?}", drift, op);
        }
    }

    #[test]
    fn prop_mode_never_reverts(steps in prop::collection::vec((any::<bool>(), 10u128..400), 1..40)) {
        let config = ProtocolConfig {
            bootstrap_debt_threshold: 2_000 * ONE,
            ..Default::default()
        };
        let mut ctx = ProtocolContext::new(config).unwrap();
        let id = ctx.open_position(ALICE, 1_000_000 * ONE).unwrap();
        let mut seen_normal = false;

        for (borrow, amount) in steps {
            let _ = if borrow {
                ctx.borrow(ALICE, id, amount * ONE, 0, &par())
                    .map(|_| ())
            } else {
                ctx.repay(ALICE, id, amount * ONE)
            };
            if seen_normal {
                prop_assert_eq!(ctx.accrual.mode, SystemMode::Normal);
            }
            seen_normal = ctx.accrual.mode == SystemMode::Normal;
        }
        prop_assert!(ctx.events.filter_by_type(EventType::ModeChanged).len() <= 1);
    }
}
