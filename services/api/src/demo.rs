use crate::infra::{
    default_coordination_config, demo_directory, parse_date, InMemoryCoordinationStore,
    InMemoryNotificationPublisher,
};
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use clap::Args;
use flatmatch::error::AppError;
use flatmatch::workflows::coordination::{
    ApplicantId, CoordinationService, EventKind, HouseholdId, MeetingFormat, Party,
    ResidentAvailability, ResidentId, VoteChoice,
};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Start of the slot lookahead window (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) from: Option<NaiveDate>,
    /// Stop after the vote; skip slot resolution and meeting negotiation.
    #[arg(long)]
    pub(crate) skip_meeting: bool,
}

type DemoService = CoordinationService<
    InMemoryCoordinationStore,
    crate::infra::StaticHouseholdDirectory,
    InMemoryNotificationPublisher,
>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let from = args.from.unwrap_or_else(|| Local::now().date_naive());

    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let service: DemoService = CoordinationService::new(
        Arc::new(InMemoryCoordinationStore::default()),
        Arc::new(demo_directory()),
        notifier.clone(),
        default_coordination_config(),
    );

    let household = HouseholdId::from("wg-sonnenallee");
    let applicant = ApplicantId::from("cand-mira");
    let alex = ResidentId::from("r-alex");
    let bo = ResidentId::from("r-bo");
    let chris = ResidentId::from("r-chris");

    println!("Flatmatch coordination demo");
    println!("Household wg-sonnenallee: r-alex (admin), r-bo, r-chris\n");

    // Intake: draft first, submit on promotion.
    service
        .save_intent(
            applicant.clone(),
            household.clone(),
            "Bioinformatics student, quiet weekdays, cooks a mean curry.".to_string(),
        )
        .map_err(demo_error)?;
    let record = service
        .promote_intent(&applicant, &household)
        .map_err(demo_error)?;
    let thread = record.application.id.clone();
    println!("{} submitted by {} -> status {}", thread, applicant, record.application.status);

    service
        .post_message(
            &thread,
            Party::Applicant,
            "Happy to drop by any evening this week!".to_string(),
        )
        .map_err(demo_error)?;

    // Voting: two of three residents suffice for the majority lock.
    service
        .cast_vote(&thread, alex.clone(), VoteChoice::Invite, None)
        .map_err(demo_error)?;
    let (record, tally) = service
        .cast_vote(&thread, bo.clone(), VoteChoice::Invite, None)
        .map_err(demo_error)?;
    println!(
        "votes: {} invite / {} decline of {} residents -> status {}",
        tally.invite, tally.decline, tally.total_residents, record.application.status
    );

    if !args.skip_meeting {
        run_meeting_negotiation(&service, &thread, from, &alex, &bo, &chris)?;
    }

    println!("\nConversation timeline:");
    let events = service.events(&thread, None, 100).map_err(demo_error)?;
    for event in &events {
        println!("  {:>3}  {}", event.seq, describe(&event.kind));
    }
    println!(
        "\n{} events dispatched to the notification hook",
        notifier.notifications().len()
    );

    Ok(())
}

fn run_meeting_negotiation(
    service: &DemoService,
    thread: &flatmatch::workflows::coordination::ApplicationId,
    from: NaiveDate,
    alex: &ResidentId,
    bo: &ResidentId,
    chris: &ResidentId,
) -> Result<(), AppError> {
    let evening = NaiveTime::from_hms_opt(18, 0, 0).expect("valid time");
    let late = NaiveTime::from_hms_opt(19, 0, 0).expect("valid time");

    let mut availabilities = ResidentAvailability::new();
    for resident in [alex, bo, chris] {
        let mut calendar = BTreeSet::new();
        calendar.insert((from + Duration::days(1), evening));
        if resident != chris {
            calendar.insert((from + Duration::days(3), late));
        }
        availabilities.insert(resident.clone(), calendar);
    }

    let slots = service
        .resolve_slots(thread, &availabilities, from, None)
        .map_err(demo_error)?;
    println!("\nCandidate slots (next {} days):", service.config().slots.lookahead_days);
    for slot in &slots {
        println!(
            "  {} {} {}: {}/{} residents available",
            slot.day_of_week,
            slot.date,
            slot.time.format("%H:%M"),
            slot.available_residents.len(),
            slot.total_residents
        );
    }

    // The household proposes the fully available slot; the applicant
    // pushes back, counter-proposes, and the household confirms.
    let full_slot = &slots[0];
    let (_, first) = service
        .propose(
            thread,
            Party::Resident {
                resident_id: alex.clone(),
            },
            full_slot.date,
            full_slot.time,
            60,
            MeetingFormat::FaceToFace,
            Some("Sonnenallee 114, ring twice".to_string()),
            None,
        )
        .map_err(demo_error)?;
    service
        .request_change(
            &first,
            Party::Applicant,
            Some("Could we do a quick video call first?".to_string()),
            None,
        )
        .map_err(demo_error)?;
    let (_, second) = service
        .propose(
            thread,
            Party::Applicant,
            full_slot.date,
            full_slot.time,
            30,
            MeetingFormat::Video,
            None,
            None,
        )
        .map_err(demo_error)?;
    let record = service
        .confirm(
            &second,
            Party::Resident {
                resident_id: bo.clone(),
            },
            None,
        )
        .map_err(demo_error)?;

    let confirmed = record
        .proposal(&second)
        .expect("confirmed proposal present");
    println!(
        "\nmeeting confirmed: {} {} ({} min, {})",
        confirmed.date,
        confirmed.time.format("%H:%M"),
        confirmed.duration_minutes,
        confirmed.format.label()
    );

    Ok(())
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::ApplicationSubmitted { applicant_id } => {
            format!("application submitted by {applicant_id}")
        }
        EventKind::VoteCast {
            resident_id,
            choice,
        } => format!("{resident_id} voted {choice}"),
        EventKind::DecisionReached {
            decision,
            forced_by: Some(admin),
        } => format!("decision forced by {admin}: {decision}"),
        EventKind::DecisionReached {
            decision,
            forced_by: None,
        } => format!("quorum reached: {decision}"),
        EventKind::ApplicationArchived => "application archived".to_string(),
        EventKind::ProposalCreated {
            proposal_id,
            date,
            time,
            format,
            ..
        } => format!(
            "proposal {proposal_id} created for {date} {} ({})",
            time.format("%H:%M"),
            format.label()
        ),
        EventKind::ProposalSuperseded {
            proposal_id,
            superseded_by,
        } => format!("proposal {proposal_id} superseded by {superseded_by}"),
        EventKind::ProposalChangeRequested {
            proposal_id,
            reason,
            ..
        } => match reason {
            Some(reason) => format!("change requested on {proposal_id}: {reason}"),
            None => format!("change requested on {proposal_id}"),
        },
        EventKind::ProposalConfirmed { proposal_id, .. } => {
            format!("proposal {proposal_id} confirmed")
        }
        EventKind::ProposalCancelled { proposal_id, .. } => {
            format!("proposal {proposal_id} cancelled")
        }
        EventKind::Message { sender, body } => match sender {
            Party::Applicant => format!("message from applicant: {body}"),
            Party::Resident { resident_id } => format!("message from {resident_id}: {body}"),
        },
    }
}

fn demo_error(err: flatmatch::workflows::coordination::CoordinationError) -> AppError {
    AppError::Io(std::io::Error::other(err.to_string()))
}
