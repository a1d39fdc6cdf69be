//! Per-symbol strategy state machine.
//!
//! ```text
//! FLAT ──signal──▶ ENTRY_PENDING ──fill──▶ OPEN ──exit──▶ EXIT_PENDING ──fill──▶ FLAT
//!   ▲                    │ reject                │ OCO leg fills (backtest)
//!   └────────────────────┴───────────────────────┘
//! RESTORING ──exit ATRs ready──▶ OPEN
//! ```
//!
//! One bar in, at most one transition out. Market orders submitted on a bar
//! fill at the next base bar's open. The orchestrator is the only owner of
//! the position; the synchronizer reaches it through [`reconcile`].
//!
//! Notifications are stamped with the time their information became known:
//! the end of the base bar that triggered them, or the reconciliation time.
//!
//! [`reconcile`]: StrategyOrchestrator::reconcile

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, info_span, warn};

use crate::domain::bar::Bar;
use crate::domain::condition_eval::entry_signal;
use crate::domain::execution::{Account, ExecutionConfig, FillResult};
use crate::domain::indicator_engine::IndicatorEngine;
use crate::domain::notification::Notification;
use crate::domain::order::{
    position_size, OcoPair, OrderIds, OrderKind, OrderSide, PendingOrder, Trigger,
};
use crate::domain::position::{
    ClosedTrade, ExitLevels, ExitReason, PersistedPositionRecord, Position, Side,
};
use crate::domain::reconcile::{self, ReconcileAction};
use crate::domain::resampler::TimeframeResampler;
use crate::domain::strategy::StrategyDefinition;
use crate::domain::timeframe::TimeframeName;
use crate::ports::broker_port::BrokerPosition;
use crate::ports::position_store::PositionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Exits are resting OCO orders checked against each bar's range.
    Backtest,
    /// No exit orders rest; the close is polled against stop and target.
    Live,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub mode: RunMode,
    pub initial_cash: f64,
    pub execution: ExecutionConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            mode: RunMode::Backtest,
            initial_cash: 1_000_000.0,
            execution: ExecutionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Flat,
    Restoring,
    EntryPending,
    Open,
    ExitPending,
}

#[derive(Debug)]
struct EntryOrder {
    order: PendingOrder,
    side: Side,
    tentative: ExitLevels,
    target_distance: f64,
    reason: String,
}

#[derive(Debug)]
struct OpenPosition {
    position: Position,
    oco: Option<OcoPair>,
    entry_reason: String,
    entry_commission: f64,
    /// Set on the bar the position appeared; exits are managed from the next.
    fresh: bool,
}

#[derive(Debug)]
enum TradeState {
    Flat,
    Restoring(PersistedPositionRecord),
    EntryPending(EntryOrder),
    Open(OpenPosition),
    ExitPending {
        open: OpenPosition,
        order: PendingOrder,
        reason: ExitReason,
    },
}

#[derive(Debug)]
enum PersistOp {
    Save(PersistedPositionRecord),
    Delete(String),
}

pub struct StrategyOrchestrator {
    symbol: String,
    strategy: StrategyDefinition,
    settings: EngineSettings,
    engine: IndicatorEngine,
    higher: Vec<(TimeframeName, TimeframeResampler)>,
    account: Account,
    state: TradeState,
    ids: OrderIds,
    trades: Vec<ClosedTrade>,
    store: Option<Arc<dyn PositionStore>>,
    pending_persist: Option<PersistOp>,
    live: bool,
    outbox: Vec<Notification>,
    last_bar: Option<Bar>,
    span: tracing::Span,
}

impl StrategyOrchestrator {
    pub fn new(symbol: &str, strategy: StrategyDefinition, settings: EngineSettings) -> Self {
        let engine = IndicatorEngine::from_strategy(&strategy);
        let higher = [TimeframeName::Medium, TimeframeName::Long]
            .into_iter()
            .map(|name| {
                let def = strategy.timeframe(name).clone();
                (name, TimeframeResampler::resample(def))
            })
            .collect();
        StrategyOrchestrator {
            symbol: symbol.to_string(),
            account: Account::new(settings.initial_cash),
            span: info_span!("symbol", symbol = %symbol),
            strategy,
            settings,
            engine,
            higher,
            state: TradeState::Flat,
            ids: OrderIds::default(),
            trades: Vec::new(),
            store: None,
            pending_persist: None,
            live: false,
            outbox: Vec::new(),
            last_bar: None,
        }
    }

    /// Replace a higher timeframe's resampler with a preloaded direct feed.
    pub fn with_direct_feed(mut self, name: TimeframeName, bars: Vec<Bar>) -> Self {
        let def = self.strategy.timeframe(name).clone();
        if let Some(slot) = self.higher.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = TimeframeResampler::for_definition(def, Some(bars));
        }
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PositionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from a persisted position; it opens once the exit ATRs are ready.
    pub fn restore(&mut self, record: PersistedPositionRecord) {
        let _guard = self.span.clone().entered();
        if matches!(self.state, TradeState::Flat) && record.size.abs() > 0.0 {
            info!(
                size = record.size,
                price = record.price,
                "restoring persisted position"
            );
            self.state = TradeState::Restoring(record);
        }
    }

    /// End of pre-roll: notifications and persistence writes start here.
    pub fn enter_live_phase(&mut self) {
        let _guard = self.span.clone().entered();
        info!("live phase started");
        self.live = true;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy(&self) -> &StrategyDefinition {
        &self.strategy
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.last_bar.as_ref()
    }

    pub fn state_kind(&self) -> StateKind {
        match self.state {
            TradeState::Flat => StateKind::Flat,
            TradeState::Restoring(_) => StateKind::Restoring,
            TradeState::EntryPending(_) => StateKind::EntryPending,
            TradeState::Open(_) => StateKind::Open,
            TradeState::ExitPending { .. } => StateKind::ExitPending,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match &self.state {
            TradeState::Open(open) | TradeState::ExitPending { open, .. } => Some(&open.position),
            _ => None,
        }
    }

    pub fn pending_order(&self) -> Option<&PendingOrder> {
        match &self.state {
            TradeState::EntryPending(entry) => Some(&entry.order),
            TradeState::ExitPending { order, .. } => Some(order),
            _ => None,
        }
    }

    /// Stop/target of the pending entry, computed from the signal bar's close.
    pub fn tentative_levels(&self) -> Option<ExitLevels> {
        match &self.state {
            TradeState::EntryPending(entry) => Some(entry.tentative),
            _ => None,
        }
    }

    pub fn oco(&self) -> Option<&OcoPair> {
        match &self.state {
            TradeState::Open(open) => open.oco.as_ref(),
            _ => None,
        }
    }

    pub fn has_pending_persistence(&self) -> bool {
        self.pending_persist.is_some()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Adopt the broker-reported cash figure; sizing uses it from the next bar.
    pub fn sync_cash(&mut self, cash: f64) {
        if cash.is_finite() && cash >= 0.0 {
            self.account.cash = cash;
        }
    }

    /// Process one closed base bar.
    pub fn on_base_bar(&mut self, bar: &Bar) {
        let _guard = self.span.clone().entered();
        if bar.volume == 0.0 {
            debug!(ts = %bar.timestamp, "heartbeat bar skipped");
            return;
        }
        if self
            .last_bar
            .as_ref()
            .is_some_and(|last| bar.timestamp <= last.timestamp)
        {
            warn!(ts = %bar.timestamp, "out-of-order bar dropped");
            return;
        }

        self.retry_persistence();
        self.fill_pending(bar);
        self.update_indicators(bar);
        self.last_bar = Some(bar.clone());

        let state = std::mem::replace(&mut self.state, TradeState::Flat);
        self.state = match state {
            TradeState::Flat => self.evaluate_entry(bar),
            TradeState::Restoring(record) => self.try_restore(record),
            TradeState::Open(open) => self.manage_open(open, bar),
            pending => pending,
        };
    }

    /// Emit trailing partial higher-timeframe buckets into the indicator set.
    pub fn flush(&mut self) {
        for (name, resampler) in self.higher.iter_mut() {
            if let Some(bar) = resampler.flush() {
                self.engine.on_bar(*name, &bar);
            }
        }
    }

    fn update_indicators(&mut self, bar: &Bar) {
        self.engine.on_bar(TimeframeName::Short, bar);
        let base_interval = self.strategy.base().interval();
        for (name, resampler) in self.higher.iter_mut() {
            for higher in resampler.on_base_bar(bar, base_interval) {
                self.engine.on_bar(*name, &higher);
            }
        }
    }

    /// Base bars are start-labelled; their content is only known at the end.
    fn bar_end(&self, bar: &Bar) -> NaiveDateTime {
        bar.timestamp + self.strategy.base().interval()
    }

    /// (risk per share, target distance) from the current exit ATRs.
    fn exit_distances(&self) -> Option<(f64, f64)> {
        let stop_atr = self.engine.exit_atr(&self.strategy.stop_loss)?;
        let target_atr = self.engine.exit_atr(&self.strategy.take_profit)?;
        Some((
            stop_atr * self.strategy.stop_loss.multiplier,
            target_atr * self.strategy.take_profit.multiplier,
        ))
    }

    fn evaluate_entry(&mut self, bar: &Bar) -> TradeState {
        let Some(signal) = entry_signal(&self.strategy, &self.engine) else {
            return TradeState::Flat;
        };
        let Some((risk_per_share, target_distance)) = self.exit_distances() else {
            debug!("entry deferred: exit ATR not ready");
            return TradeState::Flat;
        };
        let Some(size) = position_size(
            self.account.cash,
            &self.strategy.sizing,
            risk_per_share,
            bar.close,
        ) else {
            debug!(risk_per_share, "entry skipped: no size");
            return TradeState::Flat;
        };

        let order = PendingOrder {
            id: self.ids.next_id(),
            kind: OrderKind::Entry,
            side: OrderSide::opening(signal.side),
            size,
            price: None,
            trigger: Trigger::Market,
        };
        info!(
            side = %signal.side,
            size,
            order_id = order.id,
            reason = %signal.justification,
            "entry order submitted"
        );
        TradeState::EntryPending(EntryOrder {
            order,
            side: signal.side,
            tentative: ExitLevels::compute(signal.side, bar.close, risk_per_share, target_distance),
            target_distance,
            reason: signal.justification,
        })
    }

    fn fill_pending(&mut self, bar: &Bar) {
        let state = std::mem::replace(&mut self.state, TradeState::Flat);
        self.state = match state {
            TradeState::EntryPending(entry) => self.fill_entry(entry, bar),
            TradeState::ExitPending { open, reason, .. } => {
                let noticed = self.bar_end(bar);
                self.close_position(open, bar.open, true, bar.timestamp, noticed, reason);
                TradeState::Flat
            }
            other => other,
        };
    }

    fn fill_entry(&mut self, entry: EntryOrder, bar: &Bar) -> TradeState {
        let fill = match self.account.fill_entry(
            entry.order.side,
            entry.order.size,
            bar.open,
            &self.settings.execution,
        ) {
            FillResult::Filled(fill) => fill,
            FillResult::Rejected { reason } => {
                warn!(order_id = entry.order.id, %reason, "entry order rejected");
                self.notify(Notification::urgent(
                    format!("{} entry rejected", self.symbol),
                    format!("{} {} x{:.4}: {}", entry.side, self.symbol, entry.order.size, reason),
                    self.bar_end(bar),
                ));
                return TradeState::Flat;
            }
        };

        let levels = ExitLevels::compute(
            entry.side,
            fill.price,
            entry.tentative.risk_per_share,
            entry.target_distance,
        );
        let position = Position::open(
            &self.symbol,
            entry.side,
            fill.size,
            fill.price,
            bar.timestamp,
            levels,
        );
        info!(
            side = %entry.side,
            size = fill.size,
            price = fill.price,
            stop = levels.stop,
            target = levels.target,
            "entry filled"
        );
        let oco = self.exit_orders(&position);
        self.persist(PersistOp::Save(position.to_record()));
        self.notify(Notification::urgent(
            format!("{} {} entry", self.symbol, entry.side),
            format!(
                "size {:.4} @ {:.4}\nstop {:.4} / target {:.4}\n{}",
                fill.size, fill.price, levels.stop, levels.target, entry.reason
            ),
            self.bar_end(bar),
        ));
        TradeState::Open(OpenPosition {
            position,
            oco,
            entry_reason: entry.reason,
            entry_commission: fill.commission,
            fresh: true,
        })
    }

    fn exit_orders(&mut self, position: &Position) -> Option<OcoPair> {
        (self.settings.mode == RunMode::Backtest && position.has_exit_levels())
            .then(|| OcoPair::for_position(position, &mut self.ids))
    }

    fn manage_open(&mut self, mut open: OpenPosition, bar: &Bar) -> TradeState {
        if !open.position.has_exit_levels() {
            if let Some((risk_per_share, target_distance)) = self.exit_distances() {
                let levels = ExitLevels::compute(
                    open.position.side,
                    open.position.entry_price,
                    risk_per_share,
                    target_distance,
                );
                open.position.set_exit_levels(levels);
                open.oco = self.exit_orders(&open.position);
                info!(stop = levels.stop, target = levels.target, "deferred exit levels set");
            } else {
                debug!("exit levels deferred: ATR not ready");
            }
            return TradeState::Open(open);
        }
        if open.fresh {
            open.fresh = false;
            return TradeState::Open(open);
        }

        match self.settings.mode {
            RunMode::Backtest => {
                if let Some((reason, price)) = open.oco.as_ref().and_then(|oco| oco.check(bar)) {
                    let noticed = self.bar_end(bar);
                    self.close_position(open, price, false, bar.timestamp, noticed, reason);
                    return TradeState::Flat;
                }
                if let Some(stop) = open.position.trail(bar.close) {
                    if let Some(oco) = open.oco.as_mut() {
                        oco.restate_stop(stop);
                    }
                    debug!(stop, "trailing stop moved");
                }
                TradeState::Open(open)
            }
            RunMode::Live => {
                let close = bar.close;
                let hit = if open.position.should_take_profit(close) {
                    Some(ExitReason::TakeProfit)
                } else if open.position.should_stop_loss(close) {
                    Some(ExitReason::StopLoss)
                } else {
                    None
                };
                if let Some(reason) = hit {
                    let order = PendingOrder {
                        id: self.ids.next_id(),
                        kind: OrderKind::Exit,
                        side: OrderSide::closing(open.position.side),
                        size: open.position.size,
                        price: None,
                        trigger: Trigger::Market,
                    };
                    info!(%reason, close, order_id = order.id, "exit order submitted");
                    self.notify(Notification::urgent(
                        format!("{} {} exit: {}", self.symbol, open.position.side, reason),
                        format!(
                            "close {:.4}, stop {:.4}, target {:.4}",
                            close, open.position.stop_price, open.position.target_price
                        ),
                        self.bar_end(bar),
                    ));
                    return TradeState::ExitPending {
                        open,
                        order,
                        reason,
                    };
                }
                if let Some(stop) = open.position.trail(close) {
                    debug!(stop, "trailing stop moved");
                }
                TradeState::Open(open)
            }
        }
    }

    fn close_position(
        &mut self,
        open: OpenPosition,
        price: f64,
        slip: bool,
        time: NaiveDateTime,
        noticed: NaiveDateTime,
        reason: ExitReason,
    ) {
        let fill = self.account.fill_exit(
            open.position.signed_size(),
            open.position.entry_price,
            price,
            slip,
            &self.settings.execution,
        );
        let trade = open.position.close(
            fill.price,
            time,
            open.entry_commission + fill.commission,
            reason,
            open.entry_reason,
        );
        info!(
            %reason,
            side = %trade.side,
            price = trade.exit_price,
            pnl = trade.pnl,
            "position closed"
        );
        self.persist(PersistOp::Delete(self.symbol.clone()));
        self.notify(Notification::urgent(
            format!("{} {} closed: {}", self.symbol, trade.side, reason),
            format!(
                "size {:.4}, entry {:.4}, exit {:.4}, pnl {:.2}",
                trade.size, trade.entry_price, trade.exit_price, trade.pnl
            ),
            noticed,
        ));
        self.trades.push(trade);
    }

    fn try_restore(&mut self, record: PersistedPositionRecord) -> TradeState {
        let Some((risk_per_share, target_distance)) = self.exit_distances() else {
            debug!("restore deferred: exit ATR not ready");
            return TradeState::Restoring(record);
        };
        let Some(side) = Side::from_signed(record.size) else {
            return TradeState::Flat;
        };
        let levels = ExitLevels::compute(side, record.price, risk_per_share, target_distance);
        let position = Position::open(
            &self.symbol,
            side,
            record.size.abs(),
            record.price,
            record.entry_time,
            levels,
        );
        info!(
            %side,
            size = position.size,
            price = position.entry_price,
            stop = levels.stop,
            target = levels.target,
            "position restored"
        );
        let oco = self.exit_orders(&position);
        TradeState::Open(OpenPosition {
            position,
            oco,
            entry_reason: "restored".into(),
            entry_commission: 0.0,
            fresh: true,
        })
    }

    /// Bring the engine's belief in line with the broker's report, as seen at `now`.
    pub fn reconcile(
        &mut self,
        broker: Option<&BrokerPosition>,
        now: NaiveDateTime,
    ) -> ReconcileAction {
        let _guard = self.span.clone().entered();
        if let TradeState::Restoring(record) = &self.state {
            if broker.is_none_or(|b| b.size.abs() <= reconcile::EPSILON) {
                info!(size = record.size, "persisted position not held by broker, dropped");
                self.state = TradeState::Flat;
                self.persist(PersistOp::Delete(self.symbol.clone()));
                return ReconcileAction::Flatten;
            }
        }

        let action = match self.state {
            TradeState::Restoring(_) => match broker {
                Some(b) => ReconcileAction::Overwrite {
                    size: b.size,
                    price: b.price,
                },
                None => ReconcileAction::InSync,
            },
            _ => reconcile::plan(self.position(), broker),
        };
        match action {
            ReconcileAction::InSync => {}
            ReconcileAction::Inject { size, price }
            | ReconcileAction::Overwrite { size, price } => self.force_set(size, price, now),
            ReconcileAction::Flatten => self.force_flatten(now),
        }
        action
    }

    /// Overwrite the position with externally reported truth. No fill event.
    pub fn force_set(&mut self, size: f64, price: f64, now: NaiveDateTime) {
        let Some(side) = Side::from_signed(size) else {
            self.force_flatten(now);
            return;
        };
        let previous = std::mem::replace(&mut self.state, TradeState::Flat);
        let (old_size, old_price, entry_time) = match &previous {
            TradeState::Open(open) | TradeState::ExitPending { open, .. } => (
                open.position.signed_size(),
                open.position.entry_price,
                Some(open.position.entry_time),
            ),
            TradeState::Restoring(record) => (record.size, record.price, Some(record.entry_time)),
            TradeState::EntryPending(entry) => {
                info!(order_id = entry.order.id, "pending entry cancelled by reconciliation");
                (0.0, 0.0, None)
            }
            TradeState::Flat => (0.0, 0.0, None),
        };
        let entry_time = entry_time
            .or_else(|| self.last_bar.as_ref().map(|b| b.timestamp))
            .unwrap_or(now);

        let levels = self
            .exit_distances()
            .map(|(rps, distance)| ExitLevels::compute(side, price, rps, distance))
            .unwrap_or_else(ExitLevels::zero);
        let position = Position::open(&self.symbol, side, size.abs(), price, entry_time, levels);
        info!(
            old_size,
            old_price,
            new_size = size,
            new_price = price,
            stop = levels.stop,
            target = levels.target,
            "position overwritten from broker"
        );

        let oco = self.exit_orders(&position);
        self.persist(PersistOp::Save(position.to_record()));
        self.notify(Notification::normal(
            format!("{} position synchronized", self.symbol),
            format!("{old_size} @ {old_price} -> {size} @ {price}"),
            now,
        ));
        self.state = TradeState::Open(OpenPosition {
            position,
            oco,
            entry_reason: "reconciled".into(),
            entry_commission: 0.0,
            fresh: true,
        });
    }

    /// Drop the local position without a fill; the trade is booked at the
    /// last close.
    pub fn force_flatten(&mut self, now: NaiveDateTime) {
        let previous = std::mem::replace(&mut self.state, TradeState::Flat);
        match previous {
            TradeState::Open(open) | TradeState::ExitPending { open, .. } => {
                let (price, time) = match &self.last_bar {
                    Some(bar) => (bar.close, bar.timestamp),
                    None => (open.position.entry_price, open.position.entry_time),
                };
                info!(
                    old_size = open.position.signed_size(),
                    old_price = open.position.entry_price,
                    "position flattened: broker reports none"
                );
                self.close_position(open, price, false, time, now, ExitReason::Reconciled);
            }
            TradeState::Restoring(_) => {
                self.persist(PersistOp::Delete(self.symbol.clone()));
            }
            other => self.state = other,
        }
    }

    fn notify(&mut self, notification: Notification) {
        if self.live {
            self.outbox.push(notification);
        }
    }

    fn persist(&mut self, op: PersistOp) {
        if !self.live {
            return;
        }
        let Some(store) = self.store.clone() else {
            return;
        };
        let result = match &op {
            PersistOp::Save(record) => store.save(record),
            PersistOp::Delete(symbol) => store.delete(symbol),
        };
        match result {
            Ok(()) => self.pending_persist = None,
            Err(e) => {
                error!(error = %e, "position persistence failed, will retry");
                self.pending_persist = Some(op);
            }
        }
    }

    fn retry_persistence(&mut self) {
        if let Some(op) = self.pending_persist.take() {
            debug!("retrying position persistence");
            self.persist(op);
        }
    }
}
