use crate::line::Line;
use crate::Crossings;
use cambist_data::Candle;

/// Carries an indicator's previous crossing prices between evaluations, and applies
/// the shared duplicate-suppression rule: a new crossing is rejected when the stored
/// price of the previous crossing (buy & sell tracked separately) appears within the
/// last `crossing_interval` points of the signal line.
#[derive(Debug, Clone, Default)]
pub(crate) struct CrossingState {
    pub last_buy: f64,
    pub last_sell: f64,
}

impl CrossingState {
    /// Accept or suppress a buy crossing at `price` detected on `line`.
    pub fn try_buy(&mut self, line: &Line, interval: usize, price: f64) -> bool {
        if line.contains_within(interval, self.last_buy) {
            return false;
        }
        self.last_buy = price;
        true
    }

    /// Accept or suppress a sell crossing at `price` detected on `line`.
    pub fn try_sell(&mut self, line: &Line, interval: usize, price: f64) -> bool {
        if line.contains_within(interval, self.last_sell) {
            return false;
        }
        self.last_sell = price;
        true
    }
}

/// Shared moving-average crossing rule (SMA & EMA):
/// * buy — the newest point lies strictly between the newest candle's open and
///   close (open < point < close) and the line is rising into it;
/// * sell — the mirror image (close < point < open) with the line falling into it.
pub(crate) fn detect_ma_crossings(
    line: &Line,
    newest: &Candle,
    interval: usize,
    state: &mut CrossingState,
) -> Crossings {
    let mut crossings = Crossings::default();
    let (Some(last), Some(penultimate)) = (line.last(), line.penultimate()) else {
        return crossings;
    };

    if last > newest.open && last < newest.close && penultimate < last {
        crossings.buy = state.try_buy(line, interval, last);
    }
    if last < newest.open && last > newest.close && penultimate > last {
        crossings.sell = state.try_sell(line, interval, last);
    }
    crossings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, close: f64) -> Candle {
        Candle::new(0, open, close, open.min(close), open.max(close), 1.0)
    }

    #[test]
    fn buy_requires_point_between_open_and_close_and_rising_line() {
        let line: Line = [1.0, 2.0].into_iter().collect();
        let mut state = CrossingState::default();

        let crossings = detect_ma_crossings(&line, &candle(1.5, 2.5), 0, &mut state);
        assert!(crossings.buy);
        assert!(!crossings.sell);
        assert_eq!(state.last_buy, 2.0);
    }

    #[test]
    fn no_buy_when_line_is_falling() {
        let line: Line = [3.0, 2.0].into_iter().collect();
        let mut state = CrossingState::default();

        let crossings = detect_ma_crossings(&line, &candle(1.5, 2.5), 0, &mut state);
        assert!(!crossings.buy);
    }

    #[test]
    fn sell_is_the_mirror_image() {
        let line: Line = [3.0, 2.0].into_iter().collect();
        let mut state = CrossingState::default();

        let crossings = detect_ma_crossings(&line, &candle(2.5, 1.5), 0, &mut state);
        assert!(crossings.sell);
        assert!(!crossings.buy);
        assert_eq!(state.last_sell, 2.0);
    }

    #[test]
    fn duplicate_crossing_is_suppressed_within_interval() {
        let line: Line = [1.0, 2.0].into_iter().collect();
        let mut state = CrossingState {
            last_buy: 2.0,
            last_sell: 0.0,
        };

        // The stored crossing price 2.0 sits in the last 2 points, so suppress.
        let crossings = detect_ma_crossings(&line, &candle(1.5, 2.5), 2, &mut state);
        assert!(!crossings.buy);
    }

    #[test]
    fn single_point_line_never_crosses() {
        let line: Line = [2.0].into_iter().collect();
        let mut state = CrossingState::default();

        let crossings = detect_ma_crossings(&line, &candle(1.5, 2.5), 0, &mut state);
        assert_eq!(crossings, Crossings::default());
    }
}
