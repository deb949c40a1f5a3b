//! The simulation clock.

use agrosim_core::{Day, Outbox, Signal};
use chrono::Datelike;
use tracing::info;

use crate::config::OutputInterval;

/// Advances the simulated day and raises output and terminate signals.
///
/// The first [`advance`](Self::advance) returns the start date itself;
/// every later call moves one day forward. On each day the timer queues
/// [`Signal::Output`] when the interval matches, and [`Signal::Terminate`]
/// once the end date is reached.
#[derive(Clone, Debug)]
pub struct Timer {
    start: Day,
    end: Day,
    interval: OutputInterval,
    current: Option<Day>,
}

impl Timer {
    /// A clock running from `start` to `end`, both inclusive.
    pub fn new(start: Day, end: Day, interval: OutputInterval) -> Self {
        Self {
            start,
            end,
            interval,
            current: None,
        }
    }

    /// First day of the run.
    pub fn start(&self) -> Day {
        self.start
    }

    /// Last day of the run.
    pub fn end(&self) -> Day {
        self.end
    }

    /// The current day, `None` before the first advance.
    pub fn current(&self) -> Option<Day> {
        self.current
    }

    /// Move to the next day and queue its timer signals.
    ///
    /// Returns `None` if the calendar cannot represent the next day.
    pub fn advance(&mut self, outbox: &mut Outbox) -> Option<Day> {
        let day = match self.current {
            None => self.start,
            Some(day) => day.succ_opt()?,
        };
        self.current = Some(day);

        if self.is_output_day(day) {
            outbox.send(Signal::Output);
        }
        if day >= self.end {
            info!(%day, "end date reached");
            outbox.send(Signal::Terminate);
        }
        Some(day)
    }

    fn is_output_day(&self, day: Day) -> bool {
        match self.interval {
            OutputInterval::Daily { every } => {
                every > 0 && (day - self.start).num_days() % i64::from(every) == 0
            }
            OutputInterval::Weekly { weekday } => day.weekday() == weekday,
            OutputInterval::Dekadal => matches!(day.day(), 10 | 20) || is_month_end(day),
            OutputInterval::Monthly => is_month_end(day),
        }
    }
}

fn is_month_end(day: Day) -> bool {
    day.succ_opt().is_none_or(|next| next.month() != day.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn d(m: u32, day: u32) -> Day {
        Day::from_ymd_opt(2024, m, day).unwrap()
    }

    /// Days in `[from, to]` on which the timer requested output.
    fn output_days(interval: OutputInterval, from: Day, to: Day) -> Vec<Day> {
        let mut timer = Timer::new(from, to, interval);
        let mut days = Vec::new();
        loop {
            let mut outbox = Outbox::new();
            let day = timer.advance(&mut outbox).unwrap();
            if outbox.iter().any(|s| *s == Signal::Output) {
                days.push(day);
            }
            if day >= to {
                return days;
            }
        }
    }

    #[test]
    fn first_advance_returns_start() {
        let mut timer = Timer::new(d(1, 1), d(1, 3), OutputInterval::default());
        let mut outbox = Outbox::new();
        assert_eq!(timer.current(), None);
        assert_eq!(timer.advance(&mut outbox), Some(d(1, 1)));
        assert_eq!(timer.advance(&mut outbox), Some(d(1, 2)));
        assert_eq!(timer.current(), Some(d(1, 2)));
    }

    #[test]
    fn terminate_on_end_date() {
        let mut timer = Timer::new(d(1, 1), d(1, 3), OutputInterval::default());
        for expected in [false, false, true] {
            let mut outbox = Outbox::new();
            timer.advance(&mut outbox);
            assert_eq!(outbox.iter().any(|s| *s == Signal::Terminate), expected);
        }
    }

    #[test]
    fn daily_every_n() {
        let days = output_days(OutputInterval::Daily { every: 3 }, d(1, 1), d(1, 8));
        assert_eq!(days, vec![d(1, 1), d(1, 4), d(1, 7)]);
    }

    #[test]
    fn weekly_on_weekday() {
        // 2024-01-01 is a Monday.
        let days = output_days(OutputInterval::Weekly { weekday: Weekday::Wed }, d(1, 1), d(1, 14));
        assert_eq!(days, vec![d(1, 3), d(1, 10)]);
    }

    #[test]
    fn dekadal_and_monthly() {
        let dekadal = output_days(OutputInterval::Dekadal, d(2, 1), d(3, 10));
        assert_eq!(dekadal, vec![d(2, 10), d(2, 20), d(2, 29), d(3, 10)]);
        let monthly = output_days(OutputInterval::Monthly, d(1, 15), d(4, 1));
        assert_eq!(monthly, vec![d(1, 31), d(2, 29), d(3, 31)]);
    }
}
