//! Per-instrument order book and matching
//!
//! ## Structure
//! - `bids` / `asks`: one `PriceLevel` per distinct resting price, kept in a
//!   `BTreeMap` (best bid = last key, best ask = first key)
//! - `pool`: slab holding every resting order; levels link through it
//! - `stops`: pending stop orders keyed by trigger price and sequence
//! - `locations`: order id → where the order lives, for O(1)-class cancel
//!
//! ## Matching Logic
//! - **Price-time priority**: better price first, then the smaller sequence
//! - **Maker price**: every execution happens at the resting order's price
//! - **Time in force**: GTC remainder rests, IOC remainder is dropped, FOK is
//!   checked for full liquidity before anything is touched
//! - **Stops**: after the operation completes, its trades are replayed in
//!   print order against the stop index, so a sweep that trades through a
//!   trigger fires it even when the final price ends beyond it
//!
//! The book never emits events itself. Every mutation appends to an
//! `EventBuffer` that the caller forwards to its handler in order.

use super::price_level::{OrderPool, PriceLevel};
use crate::domain::error::{MarketError, RejectReason};
use crate::domain::events::MarketEvent;
use crate::domain::order::{Order, OrderSide, OrderType, TimeInForce};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Events produced by a single book operation
pub type EventBuffer = SmallVec<[MarketEvent; 8]>;

/// 订单位置信息（用于快速取消）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderLocation {
    Resting { slot: usize },
    Stop { side: OrderSide, stop_price: u64, sequence: u64 },
}

/// Pending stop orders, per side, in activation order
#[derive(Debug, Clone, Default)]
struct StopIndex {
    // Buy stops fire as the price rises: lowest trigger first
    buys: BTreeMap<(u64, u64), Order>,
    // Sell stops fire as the price falls: highest trigger first
    sells: BTreeMap<(Reverse<u64>, u64), Order>,
}

impl StopIndex {
    fn insert(&mut self, order: Order) {
        match order.side() {
            OrderSide::Bid => {
                self.buys.insert((order.stop_price(), order.sequence()), order);
            }
            OrderSide::Ask => {
                self.sells
                    .insert((Reverse(order.stop_price()), order.sequence()), order);
            }
        }
    }

    fn get(&self, side: OrderSide, stop_price: u64, sequence: u64) -> Option<&Order> {
        match side {
            OrderSide::Bid => self.buys.get(&(stop_price, sequence)),
            OrderSide::Ask => self.sells.get(&(Reverse(stop_price), sequence)),
        }
    }

    fn remove(&mut self, side: OrderSide, stop_price: u64, sequence: u64) -> Option<Order> {
        match side {
            OrderSide::Bid => self.buys.remove(&(stop_price, sequence)),
            OrderSide::Ask => self.sells.remove(&(Reverse(stop_price), sequence)),
        }
    }

    /// Takes the next stop order that fires on a trade at `last_price`
    fn pop_triggered(&mut self, last_price: u64) -> Option<Order> {
        if let Some(entry) = self.buys.first_entry() {
            if entry.key().0 <= last_price {
                return Some(entry.remove());
            }
        }
        if let Some(entry) = self.sells.first_entry() {
            if entry.key().0 .0 >= last_price {
                return Some(entry.remove());
            }
        }
        None
    }

    /// Re-prices trailing stops after a trade at `price`
    ///
    /// Returns the orders whose stop moved.
    fn retrail(&mut self, price: u64) -> Vec<Order> {
        let mut moved = Vec::new();

        let buy_keys: Vec<(u64, u64)> = self
            .buys
            .iter()
            .filter(|(_, order)| order.order_type().is_trailing())
            .map(|(key, _)| *key)
            .collect();
        for key in buy_keys {
            if let Some(mut order) = self.buys.remove(&key) {
                if order.trail(price, price) {
                    moved.push(order.clone());
                }
                self.insert(order);
            }
        }

        let sell_keys: Vec<(Reverse<u64>, u64)> = self
            .sells
            .iter()
            .filter(|(_, order)| order.order_type().is_trailing())
            .map(|(key, _)| *key)
            .collect();
        for key in sell_keys {
            if let Some(mut order) = self.sells.remove(&key) {
                if order.trail(price, price) {
                    moved.push(order.clone());
                }
                self.insert(order);
            }
        }

        moved
    }

    fn iter(&self) -> impl Iterator<Item = &Order> {
        self.buys.values().chain(self.sells.values())
    }

    fn len(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }
}

/// 订单簿核心结构
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol_id: u32,
    name: String,
    // 买单侧，按价格从高到低取用
    bids: BTreeMap<u64, PriceLevel>,
    // 卖单侧，按价格从低到高取用
    asks: BTreeMap<u64, PriceLevel>,
    pool: OrderPool,
    stops: StopIndex,
    locations: HashMap<u64, OrderLocation>,
    next_sequence: u64,
    last_traded_price: Option<u64>,
    /// Trade prices, oldest first, not yet applied to the stop index
    pending_trades: VecDeque<u64>,
}

impl OrderBook {
    pub fn new(symbol_id: u32, name: impl Into<String>) -> Self {
        Self {
            symbol_id,
            name: name.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            pool: OrderPool::with_capacity(1024),
            stops: StopIndex::default(),
            locations: HashMap::new(),
            next_sequence: 1,
            last_traded_price: None,
            pending_trades: VecDeque::new(),
        }
    }

    #[inline]
    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepts a new order
    ///
    /// Limit and market orders match immediately; stop variants park in the
    /// stop index unless the last traded price already triggers them.
    ///
    /// # Errors
    /// * `OrderAlreadyExists` if the id is resident in this book
    /// * `Rejected` if a fill-or-kill order cannot be filled completely
    ///
    /// On error the book is untouched and `events` is unchanged.
    ///
    /// Duplicate ids are detected per book only. Ids are caller-supplied and
    /// expected to be unique across every symbol; an id reused on another
    /// symbol, or after the first order left the book, is accepted.
    pub fn add_order(&mut self, mut order: Order, events: &mut EventBuffer) -> Result<(), MarketError> {
        debug_assert_eq!(order.symbol_id(), self.symbol_id);

        if self.locations.contains_key(&order.id()) {
            return Err(MarketError::OrderAlreadyExists {
                symbol_id: self.symbol_id,
                order_id: order.id(),
            });
        }

        self.pending_trades.clear();

        if order.order_type().is_stop() {
            if let Some(last) = self.last_traded_price {
                order.trail(last, last);
            }

            match self.last_traded_price {
                Some(last) if order.is_triggered_by(last) => {
                    order.activate();
                    self.accept(order, events)?;
                }
                _ => self.park_stop(order, events),
            }
        } else {
            self.accept(order, events)?;
        }

        self.activate_stop_orders(events);
        self.check_consistency();
        Ok(())
    }

    /// Cancels a resting or pending stop order
    pub fn delete_order(&mut self, order_id: u64, events: &mut EventBuffer) -> Result<(), MarketError> {
        let location = self
            .locations
            .remove(&order_id)
            .ok_or(MarketError::OrderNotFound {
                symbol_id: self.symbol_id,
                order_id,
            })?;

        let order = self.take_order(order_id, location);
        events.push(MarketEvent::order_deleted(&order));

        self.check_consistency();
        Ok(())
    }

    /// Cancels every resident order, bids first, then asks, then stops
    pub fn clear(&mut self, events: &mut EventBuffer) {
        for order_id in self.order_ids() {
            if let Some(location) = self.locations.remove(&order_id) {
                let order = self.take_order(order_id, location);
                events.push(MarketEvent::order_deleted(&order));
            }
        }
        self.check_consistency();
    }

    /// Highest resting bid price
    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest resting ask price
    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    /// Gets the current spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Gets the midpoint price ((best_bid + best_ask) / 2)
    pub fn mid_price(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(bid + (ask - bid) / 2),
            _ => None,
        }
    }

    #[inline]
    pub fn last_traded_price(&self) -> Option<u64> {
        self.last_traded_price
    }

    /// Bid levels, best first
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values().rev()
    }

    /// Ask levels, best first
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Top `levels` bid prices with their open volume
    pub fn bid_depth(&self, levels: usize) -> Vec<(u64, u64)> {
        self.bid_levels()
            .take(levels)
            .map(|level| (level.price(), level.volume()))
            .collect()
    }

    /// Top `levels` ask prices with their open volume
    pub fn ask_depth(&self, levels: usize) -> Vec<(u64, u64)> {
        self.ask_levels()
            .take(levels)
            .map(|level| (level.price(), level.volume()))
            .collect()
    }

    /// Resting orders at one price, in time priority
    pub fn orders_at(&self, side: OrderSide, price: u64) -> Vec<&Order> {
        let levels = match side {
            OrderSide::Bid => &self.bids,
            OrderSide::Ask => &self.asks,
        };
        levels
            .get(&price)
            .map(|level| level.iter(&self.pool).map(|(_, order)| order).collect())
            .unwrap_or_default()
    }

    /// Looks up a resident order (resting or pending stop)
    pub fn order(&self, order_id: u64) -> Option<&Order> {
        match *self.locations.get(&order_id)? {
            OrderLocation::Resting { slot } => self.pool.get(slot).map(|node| &node.order),
            OrderLocation::Stop {
                side,
                stop_price,
                sequence,
            } => self.stops.get(side, stop_price, sequence),
        }
    }

    #[inline]
    pub fn contains(&self, order_id: u64) -> bool {
        self.locations.contains_key(&order_id)
    }

    /// Number of resident orders, resting and pending
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    #[inline]
    pub fn stop_order_count(&self) -> usize {
        self.stops.len()
    }

    /// Panics if the book's structures disagree with each other
    ///
    /// Checks level linkage and volume, the id index, the stop index, the
    /// quantity invariant of every order and that the book is not crossed.
    pub fn assert_consistent(&self) {
        let mut resting = 0usize;

        for (side, levels) in [(OrderSide::Bid, &self.bids), (OrderSide::Ask, &self.asks)] {
            for (&price, level) in levels {
                assert_eq!(level.price(), price, "level keyed at {} reports {}", price, level.price());
                assert!(!level.is_empty(), "empty {:?} level left at {}", side, price);

                let mut volume = 0u64;
                let mut count = 0usize;
                let mut prev: Option<usize> = None;
                for (slot, order) in level.iter(&self.pool) {
                    let node = self.pool.node(slot);
                    assert_eq!(node.prev, prev, "broken back link at slot {}", slot);
                    assert_eq!(order.side(), side, "order {} on wrong side", order.id());
                    assert_eq!(order.price(), price, "order {} in wrong level", order.id());
                    assert_eq!(order.order_type(), OrderType::Limit, "order {} rests as {:?}", order.id(), order.order_type());
                    assert!(order.open_quantity() > 0, "filled order {} still resting", order.id());
                    assert_eq!(
                        order.open_quantity() + order.executed_quantity(),
                        order.quantity(),
                        "quantity invariant broken for order {}",
                        order.id()
                    );
                    assert_eq!(
                        self.locations.get(&order.id()),
                        Some(&OrderLocation::Resting { slot }),
                        "index out of sync for order {}",
                        order.id()
                    );
                    volume += order.open_quantity();
                    count += 1;
                    prev = Some(slot);
                }

                assert_eq!(volume, level.volume(), "volume mismatch at {:?} {}", side, price);
                assert_eq!(count, level.len(), "count mismatch at {:?} {}", side, price);
                resting += count;
            }
        }

        assert_eq!(resting, self.pool.len(), "pool holds orders outside any level");

        for order in self.stops.iter() {
            assert!(order.order_type().is_stop(), "non-stop order {} in stop index", order.id());
            assert_eq!(
                self.locations.get(&order.id()),
                Some(&OrderLocation::Stop {
                    side: order.side(),
                    stop_price: order.stop_price(),
                    sequence: order.sequence(),
                }),
                "stop index out of sync for order {}",
                order.id()
            );
        }

        assert_eq!(
            self.locations.len(),
            self.pool.len() + self.stops.len(),
            "order index size mismatch"
        );

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "book crossed: bid {} >= ask {}", bid, ask);
        }
    }

    #[inline]
    fn check_consistency(&self) {
        #[cfg(debug_assertions)]
        self.assert_consistent();
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Admits a market or limit order that is not yet resident
    fn accept(&mut self, mut order: Order, events: &mut EventBuffer) -> Result<(), MarketError> {
        if order.time_in_force() == TimeInForce::FOK && !self.can_fill(&order) {
            return Err(MarketError::Rejected {
                order_id: order.id(),
                reason: RejectReason::InsufficientLiquidity,
            });
        }

        order.set_sequence(self.next_sequence());
        self.execute(order, false, events);
        Ok(())
    }

    /// Matches an order and disposes of its remainder
    ///
    /// `resident` marks an order that was already announced (an activated
    /// stop): dropping it must then be reported, and resting it needs no new
    /// `OrderAdded`.
    fn execute(&mut self, mut order: Order, resident: bool, events: &mut EventBuffer) {
        self.match_order(&mut order, events);

        if order.is_filled() {
            events.push(MarketEvent::order_deleted(&order));
            return;
        }

        let rests = order.order_type() == OrderType::Limit && order.time_in_force() == TimeInForce::GTC;
        if rests {
            self.rest(order, resident, events);
        } else if resident {
            events.push(MarketEvent::order_deleted(&order));
        }
    }

    /// Full-liquidity check for fill-or-kill orders
    fn can_fill(&self, order: &Order) -> bool {
        match order.side() {
            OrderSide::Bid => Self::covers(self.asks.values(), order),
            OrderSide::Ask => Self::covers(self.bids.values().rev(), order),
        }
    }

    fn covers<'a>(levels: impl Iterator<Item = &'a PriceLevel>, order: &Order) -> bool {
        let mut needed = order.open_quantity();
        for level in levels {
            if !order.crosses(level.price()) {
                break;
            }
            if level.volume() >= needed {
                return true;
            }
            needed -= level.volume();
        }
        false
    }

    /// 撮合一个新订单
    ///
    /// Consumes the best opposite level while it crosses and the taker has
    /// open quantity. Per match: bid execution, ask execution, then the
    /// maker's delete (filled) or update (partial).
    fn match_order(&mut self, taker: &mut Order, events: &mut EventBuffer) {
        while !taker.is_filled() {
            let Some(price) = self.match_best(taker, events) else {
                break;
            };
            self.record_trade(price);
        }
    }

    /// Executes the taker against the oldest order of the best opposite level
    ///
    /// Returns the execution price, or `None` when nothing crosses.
    fn match_best(&mut self, taker: &mut Order, events: &mut EventBuffer) -> Option<u64> {
        let mut entry = match taker.side() {
            OrderSide::Bid => self.asks.first_entry(),
            OrderSide::Ask => self.bids.last_entry(),
        }?; // 对手盘为空

        let price = *entry.key();
        if !taker.crosses(price) {
            return None;
        }

        let level = entry.get_mut();
        let Some(slot) = level.front() else {
            panic!("empty price level {} in book {}", price, self.symbol_id);
        };

        let maker_filled = {
            let maker = &mut self.pool.node_mut(slot).order;
            let quantity = std::cmp::min(taker.open_quantity(), maker.open_quantity());

            maker.execute(price, quantity);
            taker.execute(price, quantity);
            level.reduce_volume(quantity);

            // 买方事件在前
            if taker.is_bid() {
                events.push(MarketEvent::executed(taker));
                events.push(MarketEvent::executed(maker));
            } else {
                events.push(MarketEvent::executed(maker));
                events.push(MarketEvent::executed(taker));
            }

            if !maker.is_filled() {
                events.push(MarketEvent::order_updated(maker));
            }
            maker.is_filled()
        };

        if maker_filled {
            level.unlink(&mut self.pool, slot);
            let maker = self.pool.remove(slot);
            self.locations.remove(&maker.id());
            if level.is_empty() {
                entry.remove();
            }
            events.push(MarketEvent::order_deleted(&maker));
        }

        Some(price)
    }

    fn record_trade(&mut self, price: u64) {
        self.last_traded_price = Some(price);
        self.pending_trades.push_back(price);
    }

    /// 将剩余数量挂到订单簿
    fn rest(&mut self, order: Order, resident: bool, events: &mut EventBuffer) {
        let order_id = order.id();
        let price = order.price();
        let side = order.side();

        let slot = self.pool.insert(order);
        let levels = match side {
            OrderSide::Bid => &mut self.bids,
            OrderSide::Ask => &mut self.asks,
        };
        levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(&mut self.pool, slot);
        self.locations.insert(order_id, OrderLocation::Resting { slot });

        if !resident {
            events.push(MarketEvent::order_added(&self.pool.node(slot).order));
        }
    }

    fn park_stop(&mut self, mut order: Order, events: &mut EventBuffer) {
        order.set_sequence(self.next_sequence());
        self.locations.insert(
            order.id(),
            OrderLocation::Stop {
                side: order.side(),
                stop_price: order.stop_price(),
                sequence: order.sequence(),
            },
        );
        events.push(MarketEvent::order_added(&order));
        self.stops.insert(order);
    }

    /// Replays the trades of the operation against the stop index
    ///
    /// Trades are applied one at a time, in the order they printed: trailing
    /// stops are re-priced, then every stop the trade satisfies fires. Trades
    /// made by fired stops join the queue, so the cascade runs until no
    /// trade is left.
    fn activate_stop_orders(&mut self, events: &mut EventBuffer) {
        while let Some(price) = self.pending_trades.pop_front() {
            if self.stops.is_empty() {
                self.pending_trades.clear();
                return;
            }

            for order in self.stops.retrail(price) {
                self.locations.insert(
                    order.id(),
                    OrderLocation::Stop {
                        side: order.side(),
                        stop_price: order.stop_price(),
                        sequence: order.sequence(),
                    },
                );
                events.push(MarketEvent::order_updated(&order));
            }

            while let Some(mut order) = self.stops.pop_triggered(price) {
                self.locations.remove(&order.id());

                order.activate();
                if order.time_in_force() == TimeInForce::FOK && !self.can_fill(&order) {
                    events.push(MarketEvent::order_deleted(&order));
                    continue;
                }

                order.set_sequence(self.next_sequence());
                events.push(MarketEvent::order_updated(&order));
                self.execute(order, true, events);
            }
        }
    }

    /// Detaches a resident order whose index entry was already removed
    fn take_order(&mut self, order_id: u64, location: OrderLocation) -> Order {
        match location {
            OrderLocation::Resting { slot } => {
                let (side, price) = {
                    let order = &self.pool.node(slot).order;
                    (order.side(), order.price())
                };
                let levels = match side {
                    OrderSide::Bid => &mut self.bids,
                    OrderSide::Ask => &mut self.asks,
                };
                let Some(level) = levels.get_mut(&price) else {
                    panic!("order {} indexed at missing level {}", order_id, price);
                };
                level.unlink(&mut self.pool, slot);
                if level.is_empty() {
                    levels.remove(&price);
                }
                self.pool.remove(slot)
            }
            OrderLocation::Stop {
                side,
                stop_price,
                sequence,
            } => match self.stops.remove(side, stop_price, sequence) {
                Some(order) => order,
                None => panic!("stop index out of sync for order {}", order_id),
            },
        }
    }

    /// Resident order ids in a stable order
    fn order_ids(&self) -> Vec<u64> {
        let mut ids = Vec::with_capacity(self.locations.len());
        for level in self.bid_levels().chain(self.ask_levels()) {
            ids.extend(level.iter(&self.pool).map(|(_, order)| order.id()));
        }
        ids.extend(self.stops.iter().map(Order::id));
        ids
    }
}
