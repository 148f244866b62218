use std::collections::BTreeSet;

use super::common::*;
use crate::workflows::coordination::slots::{resolve, ResidentAvailability, SlotWindow};

fn calendars(entries: &[(&str, &[(i32, u32, u32, u32)])]) -> ResidentAvailability {
    entries
        .iter()
        .map(|(resident, slots)| {
            let calendar: BTreeSet<_> = slots
                .iter()
                .map(|&(y, m, d, h)| (date(y, m, d), time(h, 0)))
                .collect();
            (
                crate::workflows::coordination::domain::ResidentId::from(*resident),
                calendar,
            )
        })
        .collect()
}

#[test]
fn resolution_is_deterministic() {
    let availabilities = calendars(&[
        ("r-anna", &[(2026, 8, 11, 18), (2026, 8, 13, 19)]),
        ("r-ben", &[(2026, 8, 11, 18)]),
    ]);
    let window = SlotWindow::default();
    let from = date(2026, 8, 10);

    let first = resolve(&availabilities, &window, from);
    let second = resolve(&availabilities, &window, from);
    assert_eq!(first, second);
}

#[test]
fn overlapping_offers_annotate_full_and_partial_availability() {
    // Tue 18:00 works for both residents, Thu 19:00 only for anna.
    let availabilities = calendars(&[
        ("r-anna", &[(2026, 8, 11, 18), (2026, 8, 13, 19)]),
        ("r-ben", &[(2026, 8, 11, 18)]),
    ]);

    let slots = resolve(&availabilities, &SlotWindow::default(), date(2026, 8, 10));

    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].date, date(2026, 8, 11));
    assert_eq!(slots[0].day_of_week, "Tuesday");
    assert_eq!(slots[0].available_residents.len(), 2);
    assert_eq!(slots[0].total_residents, 2);
    assert!(slots[0].is_fully_available());

    assert_eq!(slots[1].date, date(2026, 8, 13));
    assert_eq!(slots[1].day_of_week, "Thursday");
    assert_eq!(slots[1].available_residents.len(), 1);
    assert!(!slots[1].is_fully_available(), "partial slots are kept, not filtered");
}

#[test]
fn no_residents_means_no_slots() {
    let empty = ResidentAvailability::new();
    let slots = resolve(&empty, &SlotWindow::default(), date(2026, 8, 10));
    assert!(slots.is_empty());
}

#[test]
fn slots_outside_the_lookahead_window_are_dropped() {
    let availabilities = calendars(&[(
        "r-anna",
        &[
            (2026, 8, 11, 18),
            // day 15 of a 14-day window starting Aug 10
            (2026, 8, 24, 18),
        ],
    )]);

    let slots = resolve(&availabilities, &SlotWindow::default(), date(2026, 8, 10));
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].date, date(2026, 8, 11));
}

#[test]
fn slots_outside_the_hour_band_are_dropped() {
    let availabilities = calendars(&[(
        "r-anna",
        &[(2026, 8, 11, 8), (2026, 8, 11, 9), (2026, 8, 11, 20), (2026, 8, 11, 21)],
    )]);

    let slots = resolve(&availabilities, &SlotWindow::default(), date(2026, 8, 10));
    let hours: Vec<u32> = slots
        .iter()
        .map(|slot| chrono::Timelike::hour(&slot.time))
        .collect();
    assert_eq!(hours, vec![9, 20], "first and last hour are inclusive");
}

#[test]
fn output_is_chronological_across_dates_and_times() {
    let availabilities = calendars(&[
        ("r-ben", &[(2026, 8, 12, 10), (2026, 8, 11, 19)]),
        ("r-anna", &[(2026, 8, 11, 9)]),
    ]);

    let slots = resolve(&availabilities, &SlotWindow::default(), date(2026, 8, 10));
    let order: Vec<_> = slots.iter().map(|slot| (slot.date, slot.time)).collect();
    assert_eq!(
        order,
        vec![
            (date(2026, 8, 11), time(9, 0)),
            (date(2026, 8, 11), time(19, 0)),
            (date(2026, 8, 12), time(10, 0)),
        ]
    );
}

#[test]
fn a_shorter_window_can_be_requested_per_call() {
    let availabilities = calendars(&[("r-anna", &[(2026, 8, 11, 18), (2026, 8, 16, 18)])]);
    let window = SlotWindow {
        lookahead_days: 3,
        ..SlotWindow::default()
    };

    let slots = resolve(&availabilities, &window, date(2026, 8, 10));
    assert_eq!(slots.len(), 1);
}

#[test]
fn service_rejects_slot_queries_for_unknown_threads() {
    let (service, _, _) = build_service();
    let availabilities = calendars(&[("r-anna", &[(2026, 8, 11, 18)])]);

    let result = service.resolve_slots(
        &crate::workflows::coordination::domain::ApplicationId::from("app-unknown"),
        &availabilities,
        date(2026, 8, 10),
        None,
    );
    assert!(result.is_err());
}

#[test]
fn service_resolves_slots_for_existing_threads() {
    let (service, _, _) = build_service();
    let record = submit_pending(&service);
    let availabilities = calendars(&[
        ("r-anna", &[(2026, 8, 11, 18)]),
        ("r-ben", &[(2026, 8, 11, 18)]),
        ("r-cara", &[(2026, 8, 12, 18)]),
    ]);

    let slots = service
        .resolve_slots(&record.application.id, &availabilities, date(2026, 8, 10), None)
        .expect("resolution succeeds");
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].available_residents.len(), 2);
    assert_eq!(slots[0].total_residents, 3);
}
