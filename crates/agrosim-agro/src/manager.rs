//! The AgroManager: drives campaigns through the simulated calendar.

use agrosim_core::{Day, FinishType, Outbox, Signal};
use agrosim_kiosk::VariableKiosk;
use tracing::{debug, info};

use crate::campaign::{Campaign, CampaignStatus};
use crate::error::ScheduleError;
use crate::schedule::Schedule;

/// Campaign scheduler for one engine instance.
///
/// Built and validated from a [`Schedule`] before the run starts, including
/// resolution of the run's end date. Each step it activates the campaign
/// whose start date has been reached, then evaluates that campaign alone.
/// All signals go to the caller's [`Outbox`]; the manager never touches
/// components directly.
#[derive(Clone, Debug)]
pub struct AgroManager {
    campaigns: Vec<Campaign>,
    current: Option<usize>,
    start_date: Day,
    end_date: Day,
}

impl AgroManager {
    /// Validate `schedule` and resolve the run's start and end dates.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] if the schedule is empty, campaign start
    /// dates are not strictly increasing, any calendar or event table is
    /// invalid or lies outside its campaign window, or the end date cannot
    /// be determined.
    pub fn new(schedule: &Schedule) -> Result<Self, ScheduleError> {
        let defs = &schedule.campaigns;
        let first = defs.first().ok_or(ScheduleError::Empty)?;
        for pair in defs.windows(2) {
            if pair[1].start <= pair[0].start {
                return Err(ScheduleError::CampaignOrder {
                    previous: pair[0].start,
                    next: pair[1].start,
                });
            }
        }

        let campaigns = defs
            .iter()
            .enumerate()
            .map(|(i, def)| Campaign::new(def, defs.get(i + 1).map(|next| next.start)))
            .collect::<Result<Vec<_>, _>>()?;
        let end_date = resolve_end_date(&campaigns)?;
        info!(
            campaigns = campaigns.len(),
            start = %first.start,
            end = %end_date,
            "agromanagement schedule loaded"
        );
        Ok(Self {
            campaigns,
            current: None,
            start_date: first.start,
            end_date,
        })
    }

    /// Start of the first campaign.
    pub fn start_date(&self) -> Day {
        self.start_date
    }

    /// Last day of the run.
    pub fn end_date(&self) -> Day {
        self.end_date
    }

    /// Number of campaigns.
    pub fn campaign_count(&self) -> usize {
        self.campaigns.len()
    }

    /// All campaigns in order.
    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    /// Index of the active campaign.
    pub fn current_campaign(&self) -> Option<usize> {
        self.current
    }

    /// Status of campaign `index`, or `None` if out of range.
    pub fn campaign_status(&self, index: usize) -> Option<CampaignStatus> {
        self.campaigns.get(index).map(Campaign::status)
    }

    /// Days the current crop has been growing, zero outside a crop cycle.
    pub fn ndays_in_crop_cycle(&self) -> u32 {
        self.current_calendar()
            .filter(|c| c.in_crop_cycle())
            .map_or(0, |c| c.days_in_cycle())
    }

    /// Evaluate the schedule for `day`.
    ///
    /// When `day` reaches the next campaign's start date, a crop still
    /// growing in the old campaign is finished with
    /// [`FinishType::CampaignEnd`](agrosim_core::FinishType::CampaignEnd)
    /// before anything from the new campaign is queued.
    ///
    /// Fails only when a state event table monitors a variable whose
    /// current value is not numeric.
    pub fn step(
        &mut self,
        day: Day,
        kiosk: &VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<(), ScheduleError> {
        while let Some(next) = self.next_due(day) {
            if let Some(old) = self.current {
                let campaign = &mut self.campaigns[old];
                if let Some(calendar) = campaign.calendar_mut() {
                    calendar.force_finish(day, outbox);
                }
                campaign.set_status(CampaignStatus::Finished);
            }
            self.campaigns[next].set_status(CampaignStatus::Active);
            self.current = Some(next);
            info!(campaign = next, %day, "campaign started");
        }

        match self.current {
            Some(current) => self.campaigns[current].step(day, kiosk, outbox),
            None => Ok(()),
        }
    }

    /// Record that the crop finished on `day`, whatever ended it.
    ///
    /// Called by the engine when a crop finish is dispatched. Queues a
    /// [`Signal::Terminate`] when this was the last thing the schedule had
    /// left to do: no later campaign, no state events and no timed events
    /// after `day`.
    ///
    /// A [`FinishType::CampaignEnd`] finish was raised by the manager itself
    /// while switching campaigns and is ignored here; by the time it is
    /// dispatched the next campaign's crop may already have started.
    pub fn on_crop_finish(&mut self, day: Day, finish_type: FinishType, outbox: &mut Outbox) {
        if finish_type == FinishType::CampaignEnd {
            return;
        }
        let Some(current) = self.current else {
            return;
        };
        let campaign = &mut self.campaigns[current];
        match campaign.calendar_mut() {
            Some(calendar) if calendar.in_crop_cycle() => calendar.on_crop_finish(),
            _ => return,
        }
        if campaign.next_start().is_none() && campaign.is_exhausted_after(day) {
            info!(%day, "schedule exhausted after crop finish");
            outbox.send(Signal::Terminate);
        } else {
            debug!(%day, "crop finished, schedule continues");
        }
    }

    /// Mark the active campaign finished at the end of the run.
    pub fn close(&mut self) {
        if let Some(current) = self.current {
            self.campaigns[current].set_status(CampaignStatus::Finished);
        }
    }

    fn next_due(&self, day: Day) -> Option<usize> {
        let next = self.current.map_or(0, |c| c + 1);
        self.campaigns
            .get(next)
            .filter(|c| c.start() <= day)
            .map(|_| next)
    }

    fn current_calendar(&self) -> Option<&crate::CropCalendar> {
        self.current.and_then(|c| self.campaigns[c].calendar())
    }
}

fn resolve_end_date(campaigns: &[Campaign]) -> Result<Day, ScheduleError> {
    let Some(last) = campaigns.last() else {
        return Err(ScheduleError::Empty);
    };
    if last.is_empty() {
        return Ok(last.start());
    }
    if !last.state_events().is_empty() {
        return Err(ScheduleError::UndecidableEnd {
            start: last.start(),
        });
    }
    campaigns
        .iter()
        .filter_map(Campaign::last_scheduled_date)
        .max()
        .ok_or(ScheduleError::NoEndDate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{CampaignDef, CropCalendarDef, StateEventsDef, TimedEventsDef};
    use crate::ZeroCondition;
    use agrosim_core::{EndType, EngineId, FinishType, Payload, StartType, Value};
    use chrono::Days;

    fn d(m: u32, day: u32) -> Day {
        Day::from_ymd_opt(2021, m, day).unwrap()
    }

    fn calendar(start: Day, max_duration: u32) -> CropCalendarDef {
        CropCalendarDef {
            crop_name: "maize".into(),
            variety_name: "grain".into(),
            crop_start_date: start,
            crop_start_type: StartType::Sowing,
            crop_end_date: None,
            crop_end_type: EndType::Maturity,
            max_duration,
        }
    }

    fn irrigate_on(dates: &[Day]) -> TimedEventsDef {
        let payload: Payload = [("amount".to_owned(), Value::Float(2.0))].into_iter().collect();
        TimedEventsDef {
            event_signal: "irrigate".into(),
            name: "irrigation".into(),
            comment: String::new(),
            events_table: dates.iter().map(|d| (*d, payload.clone())).collect(),
        }
    }

    fn campaign(start: Day, crop: Option<CropCalendarDef>) -> CampaignDef {
        CampaignDef {
            crop_calendar: crop,
            ..CampaignDef::empty(start)
        }
    }

    /// Step day by day, feeding crop finishes back the way the engine does.
    fn run(manager: &mut AgroManager, days: u64) -> Vec<(Day, Signal)> {
        let kiosk = VariableKiosk::new(EngineId::next());
        let mut out = Vec::new();
        for i in 0..days {
            let day = manager.start_date() + Days::new(i);
            let mut outbox = Outbox::new();
            manager.step(day, &kiosk, &mut outbox).unwrap();
            while let Some(signal) = outbox.pop() {
                if let Signal::CropFinish(finish) = &signal {
                    manager.on_crop_finish(day, finish.finish_type, &mut outbox);
                }
                out.push((day, signal));
            }
        }
        out
    }

    #[test]
    fn empty_schedule_fails() {
        assert!(matches!(
            AgroManager::new(&Schedule::default()),
            Err(ScheduleError::Empty)
        ));
    }

    #[test]
    fn campaigns_must_increase() {
        let schedule = Schedule::new(vec![CampaignDef::empty(d(5, 1)), CampaignDef::empty(d(5, 1))]);
        assert!(matches!(
            AgroManager::new(&schedule),
            Err(ScheduleError::CampaignOrder { .. })
        ));
    }

    #[test]
    fn end_date_from_empty_terminator() {
        let schedule = Schedule::new(vec![
            campaign(d(3, 1), Some(calendar(d(3, 10), 100))),
            CampaignDef::empty(d(9, 1)),
        ]);
        let m = AgroManager::new(&schedule).unwrap();
        assert_eq!(m.start_date(), d(3, 1));
        assert_eq!(m.end_date(), d(9, 1));
    }

    #[test]
    fn end_date_from_calendar_and_timed_events() {
        let mut last = campaign(d(3, 1), Some(calendar(d(3, 10), 10)));
        last.timed_events.push(irrigate_on(&[d(3, 5), d(4, 2)]));
        let m = AgroManager::new(&Schedule::new(vec![last])).unwrap();
        assert_eq!(m.end_date(), d(4, 2));
    }

    #[test]
    fn state_events_in_last_campaign_are_undecidable() {
        let mut last = campaign(d(3, 1), Some(calendar(d(3, 10), 10)));
        last.state_events.push(StateEventsDef {
            event_signal: "irrigate".into(),
            event_state: "SM".into(),
            zero_condition: ZeroCondition::Falling,
            name: "dry".into(),
            comment: String::new(),
            events_table: vec![(0.2, [("amount".to_owned(), Value::Float(1.0))].into_iter().collect())],
        });
        assert!(matches!(
            AgroManager::new(&Schedule::new(vec![last])),
            Err(ScheduleError::UndecidableEnd { .. })
        ));
    }

    #[test]
    fn nothing_pins_the_end() {
        let mut last = CampaignDef::empty(d(3, 1));
        last.timed_events.push(irrigate_on(&[]));
        assert!(matches!(
            AgroManager::new(&Schedule::new(vec![last])),
            Err(ScheduleError::NoEndDate)
        ));
    }

    #[test]
    fn event_outside_window_fails() {
        let mut first = CampaignDef::empty(d(3, 1));
        first.timed_events.push(irrigate_on(&[d(4, 1)]));
        let schedule = Schedule::new(vec![first, CampaignDef::empty(d(4, 1))]);
        assert!(matches!(
            AgroManager::new(&schedule),
            Err(ScheduleError::OutsideWindow { .. })
        ));
    }

    #[test]
    fn crop_crossing_campaign_boundary_is_forced_to_finish() {
        let schedule = Schedule::new(vec![
            campaign(d(3, 1), Some(calendar(d(3, 2), 300))),
            campaign(d(3, 20), Some(calendar(d(3, 25), 5))),
        ]);
        let mut m = AgroManager::new(&schedule).unwrap();
        let events = run(&mut m, 40);

        let (day, first_finish) = events
            .iter()
            .find(|(_, s)| matches!(s, Signal::CropFinish(_)))
            .unwrap();
        assert_eq!(*day, d(3, 20));
        assert_eq!(
            *first_finish,
            Signal::CropFinish(agrosim_core::CropFinish {
                finish_type: FinishType::CampaignEnd,
                crop_delete: true,
            })
        );
        assert_eq!(m.campaign_status(0), Some(CampaignStatus::Finished));
        assert_eq!(m.campaign_status(1), Some(CampaignStatus::Active));
        // Only the second crop's own finish requests termination.
        let terminate: Vec<_> = events
            .iter()
            .filter(|(_, s)| *s == Signal::Terminate)
            .map(|(day, _)| *day)
            .collect();
        assert_eq!(terminate, vec![d(3, 30)]);
    }

    #[test]
    fn future_timed_events_postpone_termination() {
        let mut only = campaign(d(3, 1), Some(calendar(d(3, 1), 5)));
        only.timed_events.push(irrigate_on(&[d(3, 10)]));
        let mut m = AgroManager::new(&schedule_of(only)).unwrap();
        let events = run(&mut m, 12);
        assert!(events.iter().all(|(_, s)| *s != Signal::Terminate));
        assert!(events
            .iter()
            .any(|(day, s)| *day == d(3, 10) && matches!(s, Signal::Irrigate(_))));
    }

    #[test]
    fn crop_cycle_days_and_close() {
        let mut m = AgroManager::new(&schedule_of(campaign(d(3, 1), Some(calendar(d(3, 3), 50)))))
            .unwrap();
        assert_eq!(m.campaign_status(0), Some(CampaignStatus::Pending));
        run(&mut m, 6);
        assert_eq!(m.ndays_in_crop_cycle(), 3);
        m.close();
        assert_eq!(m.campaign_status(0), Some(CampaignStatus::Finished));
        assert_eq!(m.campaign_status(7), None);
    }

    fn schedule_of(campaign: CampaignDef) -> Schedule {
        Schedule::new(vec![campaign])
    }
}
