use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::{AppError, AppResult, StateViolation};
use crate::models::{Actor, Booking, Participant, ParticipantStatus};
use crate::services::booking::{can_view, court_name};
use crate::services::notifications::{Notification, NotificationKind};
use crate::services::Outcome;

fn load_booking(conn: &Connection, booking_id: &str) -> AppResult<Booking> {
    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

fn load_participant(conn: &Connection, participant_id: &str) -> AppResult<Participant> {
    queries::get_participant(conn, participant_id)?
        .ok_or_else(|| AppError::NotFound(format!("participant {participant_id}")))
}

fn notice(
    conn: &Connection,
    kind: NotificationKind,
    recipient: &str,
    booking: &Booking,
) -> AppResult<Notification> {
    let court = court_name(conn, &booking.court_id)?;
    Ok(Notification::for_booking(kind, recipient, booking, &court))
}

/// Invites a user onto a booking. A previously declined invitee is reset to
/// pending. The capacity trigger rejects the add when every seat is held.
pub fn invite(
    conn: &mut Connection,
    actor: &Actor,
    booking_id: &str,
    invited_user_id: &str,
    now: NaiveDateTime,
) -> AppResult<Outcome<Participant>> {
    let invited_user_id = invited_user_id.trim();
    if invited_user_id.is_empty() {
        return Err(AppError::Validation("invited_user_id must not be empty".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = load_booking(&tx, booking_id)?;
    if !actor.is_admin() && booking.organizer_user_id != actor.user_id {
        return Err(AppError::Forbidden);
    }
    if booking.is_cancelled() {
        return Err(AppError::State(StateViolation::BookingCancelled));
    }
    if invited_user_id == booking.organizer_user_id {
        return Err(AppError::Validation("the organizer already holds a seat".to_string()));
    }

    let participant = match queries::find_participant(&tx, booking_id, invited_user_id)? {
        Some(existing) if existing.status == ParticipantStatus::Declined => {
            queries::update_participant_status(
                &tx,
                &existing.id,
                ParticipantStatus::Declined,
                ParticipantStatus::Pending,
                now,
            )?;
            load_participant(&tx, &existing.id)?
        }
        Some(_) => {
            return Err(AppError::Conflict("user is already invited".to_string()));
        }
        None => {
            let participant = Participant {
                id: uuid::Uuid::new_v4().to_string(),
                booking_id: booking_id.to_string(),
                invited_user_id: invited_user_id.to_string(),
                status: ParticipantStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            queries::insert_participant(&tx, &participant)?;
            participant
        }
    };

    let notification = notice(&tx, NotificationKind::ParticipantInvited, invited_user_id, &booking)?;
    tx.commit()?;

    tracing::info!(booking_id = %booking_id, participant_id = %participant.id, "participant invited");
    Ok(Outcome::new(participant, vec![notification]))
}

/// Invitee answers. Pending may go either way; accepted may still decline.
pub fn respond(
    conn: &mut Connection,
    actor: &Actor,
    participant_id: &str,
    accept: bool,
    now: NaiveDateTime,
) -> AppResult<Outcome<Participant>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let participant = load_participant(&tx, participant_id)?;
    if participant.invited_user_id != actor.user_id {
        return Err(AppError::Forbidden);
    }
    let booking = load_booking(&tx, &participant.booking_id)?;
    if booking.is_cancelled() {
        return Err(AppError::State(StateViolation::BookingCancelled));
    }

    let (to, kind) = match (participant.status, accept) {
        (ParticipantStatus::Pending, true) => {
            (ParticipantStatus::Accepted, NotificationKind::ParticipantAccepted)
        }
        (ParticipantStatus::Pending | ParticipantStatus::Accepted, false) => {
            (ParticipantStatus::Declined, NotificationKind::ParticipantDeclined)
        }
        _ => return Err(AppError::State(StateViolation::ParticipantNotPending)),
    };

    if !queries::update_participant_status(&tx, participant_id, participant.status, to, now)? {
        return Err(AppError::State(StateViolation::ParticipantNotPending));
    }
    let updated = load_participant(&tx, participant_id)?;
    let notification = notice(&tx, kind, &booking.organizer_user_id, &booking)?;
    tx.commit()?;

    tracing::info!(participant_id = %participant_id, status = to.as_str(), "invitation answered");
    Ok(Outcome::new(updated, vec![notification]))
}

/// Organizer or admin removes an invitee at any status, freeing the seat.
pub fn remove(conn: &mut Connection, actor: &Actor, participant_id: &str) -> AppResult<Participant> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let participant = load_participant(&tx, participant_id)?;
    let booking = load_booking(&tx, &participant.booking_id)?;
    if !actor.is_admin() && booking.organizer_user_id != actor.user_id {
        return Err(AppError::Forbidden);
    }
    queries::delete_participant(&tx, participant_id)?;
    tx.commit()?;

    tracing::info!(participant_id = %participant_id, booking_id = %booking.id, "participant removed");
    Ok(participant)
}

pub fn list(conn: &Connection, actor: &Actor, booking_id: &str) -> AppResult<Vec<Participant>> {
    let booking = load_booking(conn, booking_id)?;
    if !can_view(conn, actor, &booking)? {
        return Err(AppError::Forbidden);
    }
    queries::list_participants(conn, booking_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::*;
    use proptest::prelude::*;

    fn now() -> NaiveDateTime {
        dt("2030-03-01 12:00")
    }

    fn setup(capacity: i64) -> Connection {
        let conn = setup_db();
        add_court(&conn, "c1", "Alpha", capacity, 3000);
        let mut b = booking("b1", "c1", "2030-03-04", "10:00", "11:00");
        b.players_count = capacity;
        add_booking(&conn, &b);
        conn
    }

    fn organizer() -> Actor {
        Actor::organizer("organizer")
    }

    #[test]
    fn test_capacity_counts_organizer() {
        let mut conn = setup(2);
        invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap();
        let second = invite(&mut conn, &organizer(), "b1", "p2", now());
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_decline_frees_seat() {
        let mut conn = setup(2);
        let p1 = invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap().value;
        let out = respond(&mut conn, &Actor::organizer("p1"), &p1.id, false, now()).unwrap();
        assert_eq!(out.value.status, ParticipantStatus::Declined);
        assert_eq!(out.notifications[0].recipient_user_id, "organizer");

        invite(&mut conn, &organizer(), "b1", "p2", now()).unwrap();
        // Re-inviting the declined user would exceed capacity again.
        let again = invite(&mut conn, &organizer(), "b1", "p1", now());
        assert!(matches!(again, Err(AppError::Conflict(_))));
        // The declined row is kept.
        assert_eq!(queries::list_participants(&conn, "b1").unwrap().len(), 2);
    }

    #[test]
    fn test_reinvite_declined_resets_to_pending() {
        let mut conn = setup(4);
        let p1 = invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap().value;
        respond(&mut conn, &Actor::organizer("p1"), &p1.id, false, now()).unwrap();
        let back = invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap().value;
        assert_eq!(back.id, p1.id);
        assert_eq!(back.status, ParticipantStatus::Pending);
    }

    #[test]
    fn test_only_invitee_answers() {
        let mut conn = setup(4);
        let p1 = invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap().value;
        let by_organizer = respond(&mut conn, &organizer(), &p1.id, true, now());
        assert!(matches!(by_organizer, Err(AppError::Forbidden)));

        let accepted = respond(&mut conn, &Actor::organizer("p1"), &p1.id, true, now()).unwrap().value;
        assert_eq!(accepted.status, ParticipantStatus::Accepted);

        let twice = respond(&mut conn, &Actor::organizer("p1"), &p1.id, true, now());
        assert!(matches!(twice, Err(AppError::State(StateViolation::ParticipantNotPending))));

        let withdrawn = respond(&mut conn, &Actor::organizer("p1"), &p1.id, false, now()).unwrap().value;
        assert_eq!(withdrawn.status, ParticipantStatus::Declined);
    }

    #[test]
    fn test_duplicate_and_self_invites_rejected() {
        let mut conn = setup(4);
        invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap();
        assert!(matches!(invite(&mut conn, &organizer(), "b1", "p1", now()), Err(AppError::Conflict(_))));
        assert!(matches!(invite(&mut conn, &organizer(), "b1", "organizer", now()), Err(AppError::Validation(_))));
        assert!(matches!(invite(&mut conn, &Actor::organizer("p1"), "b1", "p2", now()), Err(AppError::Forbidden)));
    }

    #[test]
    fn test_remove_hard_deletes() {
        let mut conn = setup(2);
        let p1 = invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap().value;
        assert!(matches!(remove(&mut conn, &Actor::organizer("p1"), &p1.id), Err(AppError::Forbidden)));
        remove(&mut conn, &Actor::admin("admin"), &p1.id).unwrap();
        assert!(queries::get_participant(&conn, &p1.id).unwrap().is_none());
        invite(&mut conn, &organizer(), "b1", "p2", now()).unwrap();
    }

    #[test]
    fn test_cancelled_booking_rejects_invites() {
        let mut conn = setup(4);
        queries::mark_booking_cancelled(&conn, "b1", now()).unwrap();
        let result = invite(&mut conn, &organizer(), "b1", "p1", now());
        assert!(matches!(result, Err(AppError::State(StateViolation::BookingCancelled))));
    }

    #[test]
    fn test_list_visible_to_invitees() {
        let mut conn = setup(4);
        invite(&mut conn, &organizer(), "b1", "p1", now()).unwrap();
        assert_eq!(list(&conn, &Actor::organizer("p1"), "b1").unwrap().len(), 1);
        assert!(matches!(list(&conn, &Actor::organizer("nobody"), "b1"), Err(AppError::Forbidden)));
    }

    proptest! {
        #[test]
        fn prop_seat_holders_never_exceed_capacity(
            capacity in prop::sample::select(vec![2i64, 4]),
            ops in prop::collection::vec((0usize..6, 0u8..3), 1..30),
        ) {
            let mut conn = setup(capacity);
            let users: Vec<String> = (0..6).map(|i| format!("p{i}")).collect();

            for (user_idx, action) in ops {
                let user = &users[user_idx];
                match action {
                    0 => {
                        let _ = invite(&mut conn, &organizer(), "b1", user, now());
                    }
                    _ => {
                        if let Some(p) = queries::find_participant(&conn, "b1", user).unwrap() {
                            let _ = respond(&mut conn, &Actor::organizer(user.clone()), &p.id, action == 1, now());
                        }
                    }
                }
                let holding = queries::list_participants(&conn, "b1")
                    .unwrap()
                    .iter()
                    .filter(|p| p.status.holds_seat())
                    .count() as i64;
                prop_assert!(holding <= capacity - 1);
            }
        }
    }
}
