//! Campaign sequencing across three consecutive campaigns.
//!
//! Campaigns start on D1 < D2 < D3. A crop still growing in campaign 1 must
//! be finished no later than D2, and nothing scheduled by campaign 1 may
//! fire on or after D2.

use agrosim_agro::{AgroManager, CampaignDef, CampaignStatus, Schedule, ZeroCondition};
use agrosim_core::{
    ComponentId, Day, EngineId, FinishType, Outbox, Signal, SignalKind, VarKind,
};
use agrosim_kiosk::VariableKiosk;
use agrosim_test_utils::{apply_n_on_state, crop_calendar, day, irrigation_table};

struct Run {
    events: Vec<(Day, Signal)>,
    statuses: Vec<(Day, Vec<CampaignStatus>)>,
}

/// Step the manager from its start to `last`, feeding crop finishes back
/// the way the engine does and publishing `DVS = day index / 10`.
fn run(manager: &mut AgroManager, last: Day) -> Run {
    let mut kiosk = VariableKiosk::new(EngineId::next());
    let crop = ComponentId(7);
    kiosk.register("DVS", crop, VarKind::State).unwrap();

    let mut events = Vec::new();
    let mut statuses = Vec::new();
    for (i, today) in manager.start_date().iter_days().enumerate() {
        if today > last {
            break;
        }
        kiosk.publish(crop, "DVS", i as f64 / 10.0).unwrap();
        let mut outbox = Outbox::new();
        manager.step(today, &kiosk, &mut outbox).unwrap();
        while let Some(signal) = outbox.pop() {
            if let Signal::CropFinish(finish) = &signal {
                manager.on_crop_finish(today, finish.finish_type, &mut outbox);
            }
            events.push((today, signal));
        }
        statuses.push((
            today,
            (0..manager.campaign_count())
                .filter_map(|c| manager.campaign_status(c))
                .collect(),
        ));
    }
    Run { events, statuses }
}

fn three_campaigns() -> (Schedule, [Day; 3]) {
    let d1 = day(2023, 3, 1);
    let d2 = day(2023, 4, 1);
    let d3 = day(2023, 5, 1);

    let mut first = CampaignDef::empty(d1);
    first.crop_calendar = Some(crop_calendar("wheat", "winter", day(2023, 3, 5), 300));
    first.timed_events.push(irrigation_table(&[(day(2023, 3, 10), 2.0), (day(2023, 3, 31), 1.0)]));
    first
        .state_events
        .push(apply_n_on_state("DVS", ZeroCondition::Rising, &[(1.0, 30.0), (9.0, 10.0)]));

    let mut second = CampaignDef::empty(d2);
    second.crop_calendar = Some(crop_calendar("potato", "early", day(2023, 4, 3), 20));
    second.timed_events.push(irrigation_table(&[(day(2023, 4, 20), 1.5)]));

    (
        Schedule::new(vec![first, second, CampaignDef::empty(d3)]),
        [d1, d2, d3],
    )
}

#[test]
fn first_crop_is_finished_by_second_campaign_start() {
    let (schedule, [_, d2, d3]) = three_campaigns();
    let mut manager = AgroManager::new(&schedule).unwrap();
    assert_eq!(manager.end_date(), d3);

    let run = run(&mut manager, d3);
    let finishes: Vec<_> = run
        .events
        .iter()
        .filter_map(|(d, s)| match s {
            Signal::CropFinish(f) => Some((*d, f.finish_type)),
            _ => None,
        })
        .collect();
    assert_eq!(
        finishes,
        vec![
            (d2, FinishType::CampaignEnd),
            (day(2023, 4, 23), FinishType::MaxDuration),
        ]
    );
}

#[test]
fn campaign_one_events_stop_at_second_start() {
    let (schedule, [d1, d2, d3]) = three_campaigns();
    let mut manager = AgroManager::new(&schedule).unwrap();
    let run = run(&mut manager, d3);

    let irrigations: Vec<Day> = run
        .events
        .iter()
        .filter(|(_, s)| s.kind() == SignalKind::Irrigate)
        .map(|(d, _)| *d)
        .collect();
    assert_eq!(
        irrigations,
        vec![day(2023, 3, 10), day(2023, 3, 31), day(2023, 4, 20)]
    );

    // DVS crosses 1.0 on day index 10 (D1 + 10). The 9.0 threshold would be
    // crossed on day index 90, long after campaign 1 ended.
    let n_days: Vec<Day> = run
        .events
        .iter()
        .filter(|(_, s)| s.kind() == SignalKind::ApplyN)
        .map(|(d, _)| *d)
        .collect();
    assert_eq!(n_days, vec![day(2023, 3, 11)]);
    assert!(n_days.iter().all(|d| *d >= d1 && *d < d2));
}

#[test]
fn statuses_follow_the_calendar() {
    let (schedule, [d1, d2, d3]) = three_campaigns();
    let mut manager = AgroManager::new(&schedule).unwrap();
    let run = run(&mut manager, d3);

    use CampaignStatus::*;
    let at = |d: Day| run.statuses.iter().find(|(s, _)| *s == d).unwrap().1.clone();
    assert_eq!(at(d1), vec![Active, Pending, Pending]);
    assert_eq!(at(d2), vec![Finished, Active, Pending]);
    assert_eq!(at(d3), vec![Finished, Finished, Active]);

    manager.close();
    assert_eq!(manager.campaign_status(2), Some(Finished));
}

#[test]
fn crop_start_follows_forced_finish_on_shared_day() {
    let d1 = day(2023, 3, 1);
    let d2 = day(2023, 3, 20);
    let mut first = CampaignDef::empty(d1);
    first.crop_calendar = Some(crop_calendar("wheat", "winter", d1, 100));
    let mut second = CampaignDef::empty(d2);
    second.crop_calendar = Some(crop_calendar("maize", "grain", d2, 10));
    let mut manager = AgroManager::new(&Schedule::new(vec![first, second])).unwrap();

    let run = run(&mut manager, d2);
    let on_d2: Vec<SignalKind> = run
        .events
        .iter()
        .filter(|(d, _)| *d == d2)
        .map(|(_, s)| s.kind())
        .collect();
    assert_eq!(on_d2, vec![SignalKind::CropFinish, SignalKind::CropStart]);
}
