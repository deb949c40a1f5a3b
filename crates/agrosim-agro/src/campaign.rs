//! One campaign of the schedule and its status.

use std::fmt;

use agrosim_core::{Day, Outbox};
use agrosim_kiosk::VariableKiosk;

use crate::calendar::CropCalendar;
use crate::error::ScheduleError;
use crate::schedule::CampaignDef;
use crate::state_events::StateEventTable;
use crate::timed_events::TimedEventTable;

/// Lifecycle of a campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CampaignStatus {
    /// Start date not reached yet.
    Pending,
    /// Currently evaluated every step.
    Active,
    /// Superseded by the next campaign, or closed at the end of the run.
    Finished,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Finished => "finished",
        })
    }
}

/// A validated campaign: the window `[start, next_start)` and everything
/// scheduled inside it.
#[derive(Clone, Debug)]
pub struct Campaign {
    start: Day,
    next_start: Option<Day>,
    calendar: Option<CropCalendar>,
    timed: Vec<TimedEventTable>,
    state: Vec<StateEventTable>,
    status: CampaignStatus,
}

impl Campaign {
    /// Build a campaign and check every date against its window.
    pub fn new(def: &CampaignDef, next_start: Option<Day>) -> Result<Self, ScheduleError> {
        let calendar = def
            .crop_calendar
            .as_ref()
            .map(CropCalendar::new)
            .transpose()?;
        if let Some(calendar) = &calendar {
            calendar.validate(def.start, next_start)?;
        }
        let timed = def
            .timed_events
            .iter()
            .map(TimedEventTable::new)
            .collect::<Result<Vec<_>, _>>()?;
        for table in &timed {
            table.validate(def.start, next_start)?;
        }
        let state = def
            .state_events
            .iter()
            .map(StateEventTable::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            start: def.start,
            next_start,
            calendar,
            timed,
            state,
            status: CampaignStatus::Pending,
        })
    }

    /// First day of the campaign.
    pub fn start(&self) -> Day {
        self.start
    }

    /// Start of the following campaign, `None` for the last one.
    pub fn next_start(&self) -> Option<Day> {
        self.next_start
    }

    /// Current status.
    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    /// The campaign's crop calendar, if any.
    pub fn calendar(&self) -> Option<&CropCalendar> {
        self.calendar.as_ref()
    }

    /// Timed event tables in declaration order.
    pub fn timed_events(&self) -> &[TimedEventTable] {
        &self.timed
    }

    /// State event tables in declaration order.
    pub fn state_events(&self) -> &[StateEventTable] {
        &self.state
    }

    /// A campaign with no crop and no events.
    pub fn is_empty(&self) -> bool {
        self.calendar.is_none() && self.timed.is_empty() && self.state.is_empty()
    }

    /// Latest date pinned by the crop calendar or a timed table.
    pub fn last_scheduled_date(&self) -> Option<Day> {
        let calendar = self.calendar.as_ref().map(CropCalendar::end_date);
        let timed = self.timed.iter().filter_map(TimedEventTable::last_date);
        calendar.into_iter().chain(timed).max()
    }

    /// Whether nothing can happen in this campaign after `day`.
    pub fn is_exhausted_after(&self, day: Day) -> bool {
        let crop_done = self
            .calendar
            .as_ref()
            .is_none_or(|c| !c.in_crop_cycle() && !c.is_pending());
        crop_done && self.state.is_empty() && !self.timed.iter().any(|t| t.has_events_after(day))
    }

    pub(crate) fn set_status(&mut self, status: CampaignStatus) {
        self.status = status;
    }

    pub(crate) fn calendar_mut(&mut self) -> Option<&mut CropCalendar> {
        self.calendar.as_mut()
    }

    /// Evaluate the calendar, then timed tables, then state tables.
    pub(crate) fn step(
        &mut self,
        day: Day,
        kiosk: &VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<(), ScheduleError> {
        if let Some(calendar) = &mut self.calendar {
            calendar.step(day, outbox);
        }
        for table in &self.timed {
            table.step(day, outbox);
        }
        for table in &mut self.state {
            table.step(kiosk, outbox)?;
        }
        Ok(())
    }
}
