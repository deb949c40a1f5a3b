//! Crop calendar: when a crop starts and when it must finish.

use agrosim_core::{
    CropFinish, CropStart, Day, EndType, FinishType, Outbox, Signal, StartType,
};
use chrono::Days;
use tracing::info;

use crate::error::{check_window, ScheduleError};
use crate::schedule::CropCalendarDef;

/// The crop of one campaign.
///
/// Sends [`Signal::CropStart`] once, on the start date, and
/// [`Signal::CropFinish`] once, when the end date is reached (for
/// `harvest` and `earliest`) or when `max_duration` days have elapsed,
/// whichever comes first. A finish signaled by the crop itself (natural
/// maturity) ends the cycle through [`on_crop_finish`](Self::on_crop_finish).
#[derive(Clone, Debug)]
pub struct CropCalendar {
    crop_name: String,
    variety_name: String,
    start_date: Day,
    start_type: StartType,
    end_date: Option<Day>,
    end_type: EndType,
    max_duration: u32,
    in_crop_cycle: bool,
    finished: bool,
    duration: u32,
}

impl CropCalendar {
    /// Build a calendar, checking its own dates.
    pub fn new(def: &CropCalendarDef) -> Result<Self, ScheduleError> {
        if def.max_duration == 0 {
            return Err(ScheduleError::ZeroMaxDuration {
                crop: def.crop_name.clone(),
            });
        }
        match (def.crop_end_type, def.crop_end_date) {
            (EndType::Harvest | EndType::Earliest, None) => {
                return Err(ScheduleError::MissingEndDate {
                    crop: def.crop_name.clone(),
                    end_type: def.crop_end_type,
                });
            }
            (_, Some(end)) if end <= def.crop_start_date => {
                return Err(ScheduleError::CropEndBeforeStart {
                    crop: def.crop_name.clone(),
                    start: def.crop_start_date,
                    end,
                });
            }
            _ => {}
        }
        Ok(Self {
            crop_name: def.crop_name.clone(),
            variety_name: def.variety_name.clone(),
            start_date: def.crop_start_date,
            start_type: def.crop_start_type,
            end_date: def.crop_end_date,
            end_type: def.crop_end_type,
            max_duration: def.max_duration,
            in_crop_cycle: false,
            finished: false,
            duration: 0,
        })
    }

    /// Check that the start date lies in the campaign window
    /// `[campaign_start, next_campaign_start)`.
    pub fn validate(&self, campaign_start: Day, next_start: Option<Day>) -> Result<(), ScheduleError> {
        check_window(
            || format!("crop start of '{}'", self.crop_name),
            self.start_date,
            campaign_start,
            next_start,
        )
    }

    /// Last day the crop can possibly be active.
    ///
    /// The explicit end date for `harvest` and `earliest`; otherwise the
    /// start date plus `max_duration`.
    pub fn end_date(&self) -> Day {
        match (self.end_type, self.end_date) {
            (EndType::Harvest | EndType::Earliest, Some(end)) => end,
            _ => self
                .start_date
                .checked_add_days(Days::new(u64::from(self.max_duration)))
                .unwrap_or(Day::MAX),
        }
    }

    /// Crop name.
    pub fn crop_name(&self) -> &str {
        &self.crop_name
    }

    /// Start date.
    pub fn start_date(&self) -> Day {
        self.start_date
    }

    /// Whether the crop is currently growing.
    pub fn in_crop_cycle(&self) -> bool {
        self.in_crop_cycle
    }

    /// Whether the crop has not started yet.
    pub fn is_pending(&self) -> bool {
        !self.in_crop_cycle && !self.finished
    }

    /// Days elapsed since the crop started.
    pub fn days_in_cycle(&self) -> u32 {
        self.duration
    }

    /// Evaluate the calendar for `day`.
    pub fn step(&mut self, day: Day, outbox: &mut Outbox) {
        if self.in_crop_cycle {
            self.duration += 1;
        }

        if day == self.start_date && self.is_pending() {
            self.in_crop_cycle = true;
            info!(crop = %self.crop_name, variety = %self.variety_name, %day, "crop start");
            outbox.send(Signal::CropStart(CropStart {
                crop_name: self.crop_name.clone(),
                variety_name: self.variety_name.clone(),
                start_type: self.start_type,
                end_type: self.end_type,
            }));
        }

        if !self.in_crop_cycle {
            return;
        }
        let finish_type = if matches!(self.end_type, EndType::Harvest | EndType::Earliest)
            && self.end_date == Some(day)
        {
            Some(FinishType::Harvest)
        } else if self.duration == self.max_duration {
            Some(FinishType::MaxDuration)
        } else {
            None
        };
        if let Some(finish_type) = finish_type {
            info!(crop = %self.crop_name, %day, %finish_type, "crop calendar finishes crop");
            outbox.send(Signal::CropFinish(CropFinish {
                finish_type,
                crop_delete: true,
            }));
        }
    }

    /// Record that the crop cycle ended, whatever ended it.
    pub fn on_crop_finish(&mut self) {
        self.in_crop_cycle = false;
        self.finished = true;
    }

    /// End a crop that is still growing when its campaign ends.
    pub fn force_finish(&mut self, day: Day, outbox: &mut Outbox) {
        if !self.in_crop_cycle {
            return;
        }
        info!(crop = %self.crop_name, %day, "campaign ended before the crop finished");
        outbox.send(Signal::CropFinish(CropFinish {
            finish_type: FinishType::CampaignEnd,
            crop_delete: true,
        }));
        self.on_crop_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> Day {
        Day::from_ymd_opt(2020, m, day).unwrap()
    }

    fn def(end_type: EndType, end: Option<Day>, max_duration: u32) -> CropCalendarDef {
        CropCalendarDef {
            crop_name: "wheat".into(),
            variety_name: "winter".into(),
            crop_start_date: d(3, 1),
            crop_start_type: StartType::Emergence,
            crop_end_date: end,
            crop_end_type: end_type,
            max_duration,
        }
    }

    fn run(cal: &mut CropCalendar, from: Day, days: u64) -> Vec<(Day, Signal)> {
        let mut out = Vec::new();
        for i in 0..days {
            let day = from + Days::new(i);
            let mut outbox = Outbox::new();
            cal.step(day, &mut outbox);
            for s in outbox.drain() {
                if matches!(s, Signal::CropFinish(_)) {
                    cal.on_crop_finish();
                }
                out.push((day, s));
            }
        }
        out
    }

    #[test]
    fn max_duration_finish() {
        let mut cal = CropCalendar::new(&def(EndType::Maturity, None, 10)).unwrap();
        assert_eq!(cal.end_date(), d(3, 11));
        let events = run(&mut cal, d(2, 25), 30);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, d(3, 1));
        assert!(matches!(events[0].1, Signal::CropStart(_)));
        assert_eq!(events[1].0, d(3, 11));
        assert_eq!(
            events[1].1,
            Signal::CropFinish(CropFinish {
                finish_type: FinishType::MaxDuration,
                crop_delete: true
            })
        );
    }

    #[test]
    fn harvest_on_end_date() {
        let mut cal = CropCalendar::new(&def(EndType::Harvest, Some(d(3, 5)), 300)).unwrap();
        let events = run(&mut cal, d(3, 1), 10);
        assert_eq!(events[1].0, d(3, 5));
        assert!(matches!(
            events[1].1,
            Signal::CropFinish(CropFinish {
                finish_type: FinishType::Harvest,
                ..
            })
        ));
    }

    #[test]
    fn earliest_prefers_max_duration_when_shorter() {
        let mut cal = CropCalendar::new(&def(EndType::Earliest, Some(d(4, 1)), 5)).unwrap();
        let events = run(&mut cal, d(3, 1), 40);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].0, d(3, 6));
    }

    #[test]
    fn harvest_needs_end_date() {
        assert!(matches!(
            CropCalendar::new(&def(EndType::Harvest, None, 100)),
            Err(ScheduleError::MissingEndDate { .. })
        ));
    }

    #[test]
    fn end_must_follow_start() {
        assert!(matches!(
            CropCalendar::new(&def(EndType::Harvest, Some(d(3, 1)), 100)),
            Err(ScheduleError::CropEndBeforeStart { .. })
        ));
        assert!(matches!(
            CropCalendar::new(&def(EndType::Maturity, None, 0)),
            Err(ScheduleError::ZeroMaxDuration { .. })
        ));
    }

    #[test]
    fn start_must_be_inside_campaign() {
        let cal = CropCalendar::new(&def(EndType::Maturity, None, 10)).unwrap();
        cal.validate(d(1, 1), Some(d(6, 1))).unwrap();
        assert!(matches!(
            cal.validate(d(1, 1), Some(d(3, 1))),
            Err(ScheduleError::OutsideWindow { .. })
        ));
        assert!(cal.validate(d(3, 2), None).is_err());
    }

    #[test]
    fn forced_finish_only_when_growing() {
        let mut cal = CropCalendar::new(&def(EndType::Maturity, None, 100)).unwrap();
        let mut outbox = Outbox::new();
        cal.force_finish(d(2, 1), &mut outbox);
        assert!(outbox.is_empty());
        assert!(cal.is_pending());

        cal.step(d(3, 1), &mut outbox);
        outbox.drain().for_each(drop);
        cal.force_finish(d(3, 2), &mut outbox);
        assert!(matches!(
            outbox.pop(),
            Some(Signal::CropFinish(CropFinish {
                finish_type: FinishType::CampaignEnd,
                ..
            }))
        ));
        assert!(!cal.in_crop_cycle());
        assert!(!cal.is_pending());
    }
}
