use cambist_data::{MarketOrder, Side};
use cambist_instrument::{Currency, Market};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// The BUY orders of one traded currency whose position is still open: filled but
/// not yet closed out by a matched SELL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrdersProfit {
    orders: BTreeSet<MarketOrder>,
}

impl OrdersProfit {
    /// Constructs an empty [`OrdersProfit`] group.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: MarketOrder) {
        self.orders.insert(order);
    }

    pub fn remove(&mut self, order: &MarketOrder) {
        self.orders.remove(order);
    }

    pub fn contains(&self, order: &MarketOrder) -> bool {
        self.orders.contains(order)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketOrder> {
        self.orders.iter()
    }

    /// Base-currency value committed by this group.
    pub fn total_cost(&self) -> f64 {
        self.orders.iter().map(MarketOrder::cost).sum()
    }
}

/// A set of `(from, to)` order pairs with fixed sides — in this engine always
/// `(SELL, BUY)`, meaning a sell was opened to close out a prior buy. Each `from`
/// order appears at most once; re-recording a pair is a no-op.
#[derive(Debug, Clone)]
pub struct OrderMatching {
    from_side: Side,
    to_side: Side,
    pairs: BTreeMap<MarketOrder, MarketOrder>,
}

impl OrderMatching {
    /// Constructs an empty [`OrderMatching`] with the given side pairing.
    pub fn new(from_side: Side, to_side: Side) -> Self {
        Self {
            from_side,
            to_side,
            pairs: BTreeMap::new(),
        }
    }

    /// Record a matching. Pairs with the wrong sides are rejected & logged;
    /// an existing `from` entry is left untouched (idempotent re-record).
    pub fn insert(&mut self, from: MarketOrder, to: MarketOrder) {
        if from.side != self.from_side || to.side != self.to_side {
            warn!(
                from = %from.describe(),
                to = %to.describe(),
                "order matching sides mismatch, pair dropped"
            );
            return;
        }
        self.pairs.entry(from).or_insert(to);
    }

    /// Remove the matching keyed by `from`, returning the matched order.
    pub fn remove(&mut self, from: &MarketOrder) -> Option<MarketOrder> {
        self.pairs.remove(from)
    }

    /// The order matched to `from`.
    pub fn matched_of(&self, from: &MarketOrder) -> Option<&MarketOrder> {
        self.pairs.get(from)
    }

    pub fn contains(&self, from: &MarketOrder) -> bool {
        self.pairs.contains_key(from)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MarketOrder, &MarketOrder)> {
        self.pairs.iter()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

impl Default for OrderMatching {
    fn default() -> Self {
        Self::new(Side::Sell, Side::Buy)
    }
}

/// In-memory authoritative mirror of one configuration's open trading state.
///
/// Lives on the engine worker thread & is never shared; the UI receives snapshot
/// copies through the stats worker instead.
#[derive(Debug, Clone, Default)]
pub struct TradeOrdersHolder {
    open_buys: BTreeSet<MarketOrder>,
    open_sells: BTreeSet<MarketOrder>,
    orders_profit: HashMap<Currency, OrdersProfit>,
    matching: OrderMatching,
}

impl TradeOrdersHolder {
    /// Constructs an empty [`TradeOrdersHolder`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_buy_order(&mut self, order: MarketOrder) {
        self.open_buys.insert(order);
    }

    pub fn remove_buy_order(&mut self, order: &MarketOrder) {
        self.open_buys.remove(order);
    }

    pub fn contains_buy_order(&self, order: &MarketOrder) -> bool {
        self.open_buys.contains(order)
    }

    pub fn add_sell_order(&mut self, order: MarketOrder) {
        self.open_sells.insert(order);
    }

    pub fn remove_sell_order(&mut self, order: &MarketOrder) {
        self.open_sells.remove(order);
    }

    pub fn contains_sell_order(&self, order: &MarketOrder) -> bool {
        self.open_sells.contains(order)
    }

    pub fn buy_orders_count(&self) -> usize {
        self.open_buys.len()
    }

    pub fn sell_orders_count(&self) -> usize {
        self.open_sells.len()
    }

    pub fn buy_orders(&self) -> impl Iterator<Item = &MarketOrder> {
        self.open_buys.iter()
    }

    pub fn sell_orders(&self) -> impl Iterator<Item = &MarketOrder> {
        self.open_sells.iter()
    }

    /// Local open BUYs the remote snapshot no longer reports — filled or canceled.
    pub fn buy_orders_diff(&self, remote: &BTreeSet<MarketOrder>) -> Vec<MarketOrder> {
        self.open_buys.difference(remote).cloned().collect()
    }

    /// Local open SELLs the remote snapshot no longer reports.
    pub fn sell_orders_diff(&self, remote: &BTreeSet<MarketOrder>) -> Vec<MarketOrder> {
        self.open_sells.difference(remote).cloned().collect()
    }

    /// Number of open BUYs on `market`.
    pub fn buy_open_positions_for(&self, market: Market) -> usize {
        self.open_buys
            .iter()
            .filter(|order| order.market() == market)
            .count()
    }

    /// The profit group of `currency`, if one exists.
    pub fn orders_profit(&self, currency: Currency) -> Option<&OrdersProfit> {
        self.orders_profit.get(&currency)
    }

    /// The profit group of `currency`, created on first use.
    pub fn orders_profit_mut(&mut self, currency: Currency) -> &mut OrdersProfit {
        self.orders_profit.entry(currency).or_default()
    }

    /// Every profit group, keyed by traded currency.
    pub fn profit_groups(&self) -> impl Iterator<Item = (&Currency, &OrdersProfit)> {
        self.orders_profit.iter()
    }

    pub fn matching(&self) -> &OrderMatching {
        &self.matching
    }

    pub fn matching_mut(&mut self) -> &mut OrderMatching {
        &mut self.matching
    }

    /// Total base-currency value committed across open buys, open sells (valued at
    /// the matched buy's cost) and unpaired filled buys.
    pub fn coin_in_trading(&self) -> f64 {
        let mut total = self
            .open_buys
            .iter()
            .map(MarketOrder::cost)
            .sum::<f64>();

        for sell in &self.open_sells {
            match self.matching.matched_of(sell) {
                Some(buy) => total += buy.cost(),
                None => warn!(
                    sell = %sell.describe(),
                    "open sell without matched buy excluded from coin-in-trading"
                ),
            }
        }

        total
            + self
                .orders_profit
                .values()
                .map(OrdersProfit::total_cost)
                .sum::<f64>()
    }

    pub fn clear(&mut self) {
        self.open_buys.clear();
        self.open_sells.clear();
        self.orders_profit.clear();
        self.matching.clear();
    }
}
