use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::{AppError, AppResult, StateViolation};
use crate::models::{Actor, PaymentLogStatus, Refund, RefundStatus};
use crate::services::booking::court_name;
use crate::services::notifications::{Notification, NotificationKind};
use crate::services::payments::RefundRequest;
use crate::services::Outcome;
use crate::state::AppState;

fn load_pending(conn: &Connection, refund_id: &str) -> AppResult<Refund> {
    let refund = queries::get_refund(conn, refund_id)?
        .ok_or_else(|| AppError::NotFound(format!("refund {refund_id}")))?;
    if refund.status != RefundStatus::Pending {
        return Err(AppError::State(StateViolation::RefundNotPending));
    }
    Ok(refund)
}

fn review_notice(conn: &Connection, kind: NotificationKind, refund: &Refund) -> AppResult<Notification> {
    let notification = match queries::get_booking(conn, &refund.booking_id)? {
        Some(booking) => {
            let court = court_name(conn, &booking.court_id)?;
            Notification::for_booking(kind, &refund.user_id, &booking, &court)
        }
        // Hard-deleted bookings still get their refund notice.
        None => Notification::new(kind, &refund.user_id, &refund.booking_id),
    };
    Ok(notification.with_amount(refund.amount))
}

/// Gateway-side refund request for a pending refund: every settled charge on the booking.
pub fn refund_request(conn: &Connection, refund_id: &str) -> AppResult<RefundRequest> {
    let refund = load_pending(conn, refund_id)?;
    let charge_refs = queries::list_payment_logs(conn, &refund.booking_id)?
        .into_iter()
        .filter(|log| log.status == PaymentLogStatus::Succeeded)
        .filter_map(|log| log.gateway_ref)
        .collect();
    Ok(RefundRequest {
        refund_id: refund.id,
        booking_id: refund.booking_id,
        charge_refs,
        amount: refund.amount,
    })
}

/// Claims a pending refund before the provider is asked to pay it out.
/// A claimed refund can still be approved, and re-claimed after a crash,
/// but no longer rejected.
pub fn claim_for_approval(
    conn: &Connection,
    reviewer: &Actor,
    refund_id: &str,
    now: NaiveDateTime,
) -> AppResult<RefundRequest> {
    let request = refund_request(conn, refund_id)?;
    if !queries::claim_refund(conn, refund_id, &reviewer.user_id, now)? {
        return Err(AppError::State(StateViolation::RefundNotPending));
    }
    tracing::info!(refund_id = %refund_id, reviewer = %reviewer.user_id, "refund claimed for approval");
    Ok(request)
}

pub fn release_claim(conn: &Connection, reviewer: &Actor, refund_id: &str, claimed_at: NaiveDateTime) -> AppResult<()> {
    if queries::release_refund_claim(conn, refund_id, &reviewer.user_id, claimed_at)? {
        tracing::info!(refund_id = %refund_id, "refund claim released");
    }
    Ok(())
}

/// Stamps approval once the provider has accepted the refund.
pub fn mark_approved(
    conn: &Connection,
    reviewer: &Actor,
    refund_id: &str,
    gateway_ref: &str,
    now: NaiveDateTime,
) -> AppResult<Outcome<Refund>> {
    let mut refund = load_pending(conn, refund_id)?;
    refund.status = RefundStatus::Approved;
    refund.reviewed_by = Some(reviewer.user_id.clone());
    refund.reviewed_at = Some(now);
    refund.gateway_ref = Some(gateway_ref.to_string());

    if !queries::complete_refund_review(conn, &refund)? {
        return Err(AppError::State(StateViolation::RefundNotPending));
    }
    tracing::info!(refund_id = %refund.id, gateway_ref = %gateway_ref, "refund approved");

    let notification = review_notice(conn, NotificationKind::RefundApproved, &refund)?;
    Ok(Outcome::new(refund, vec![notification]))
}

pub fn reject(
    conn: &Connection,
    reviewer: &Actor,
    refund_id: &str,
    reason: &str,
    now: NaiveDateTime,
) -> AppResult<Outcome<Refund>> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("a rejection reason is required".to_string()));
    }

    let mut refund = load_pending(conn, refund_id)?;
    if refund.reviewed_by.is_some() {
        return Err(AppError::State(StateViolation::RefundInReview));
    }
    refund.status = RefundStatus::Rejected;
    refund.reviewed_by = Some(reviewer.user_id.clone());
    refund.reviewed_at = Some(now);
    refund.rejection_reason = Some(reason.to_string());

    if !queries::complete_refund_review(conn, &refund)? {
        return Err(AppError::State(StateViolation::RefundNotPending));
    }
    tracing::info!(refund_id = %refund.id, "refund rejected");

    let notification = review_notice(conn, NotificationKind::RefundRejected, &refund)?.with_reason(reason);
    Ok(Outcome::new(refund, vec![notification]))
}

/// Approval only advances after the provider accepts the refund. The refund
/// is claimed first so a reject cannot land while the provider call is in
/// flight. A provider failure releases the claim and leaves the refund
/// pending. The booking itself is not touched; the provider's refund event
/// later lowers `amount_paid`.
pub async fn approve(state: &AppState, reviewer: &Actor, refund_id: &str) -> AppResult<Outcome<Refund>> {
    let claimed_at = state.config.local_now();
    let request = {
        let conn = state.conn()?;
        claim_for_approval(&conn, reviewer, refund_id, claimed_at)?
    };

    let gateway_ref = match state.gateway.refund(&request).await {
        Ok(gateway_ref) => gateway_ref,
        Err(e) => {
            tracing::error!(error = %e, refund_id = %refund_id, "gateway refund failed");
            let conn = state.conn()?;
            release_claim(&conn, reviewer, refund_id, claimed_at)?;
            return Err(AppError::Gateway(e.to_string()));
        }
    };

    let conn = state.conn()?;
    mark_approved(&conn, reviewer, refund_id, &gateway_ref, state.config.local_now())
}

pub fn list_for_admin(conn: &Connection, status: Option<RefundStatus>) -> AppResult<Vec<Refund>> {
    queries::list_refunds(conn, status, None)
}

pub fn list_for_user(conn: &Connection, actor: &Actor) -> AppResult<Vec<Refund>> {
    queries::list_refunds(conn, None, Some(&actor.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CancelledBy, PaymentLog, PaymentType};
    use crate::services::testing::*;

    fn now() -> NaiveDateTime {
        dt("2030-03-01 12:00")
    }

    fn seed_refund(conn: &Connection) -> Refund {
        add_court(conn, "c1", "Alpha", 4, 3000);
        let mut b = booking("b1", "c1", "2030-03-04", "10:00", "11:00");
        b.amount_paid = 3000;
        b.payment_status = crate::models::PaymentStatus::PaymentCompleted;
        add_booking(conn, &b);
        for (id, status, reference) in [
            ("l1", PaymentLogStatus::Succeeded, Some("ch_1")),
            ("l2", PaymentLogStatus::Failed, Some("ch_2")),
            ("l3", PaymentLogStatus::Pending, None),
        ] {
            queries::insert_payment_log(
                conn,
                &PaymentLog {
                    id: id.to_string(),
                    booking_id: "b1".to_string(),
                    user_id: "organizer".to_string(),
                    amount: 3000,
                    payment_type: PaymentType::Full,
                    status,
                    gateway_ref: reference.map(|r| r.to_string()),
                    error_message: None,
                    created_at: now(),
                    updated_at: now(),
                },
            )
            .unwrap();
        }
        let refund = Refund {
            id: "r1".to_string(),
            booking_id: "b1".to_string(),
            user_id: "organizer".to_string(),
            amount: 3000,
            status: RefundStatus::Pending,
            cancelled_by: CancelledBy::Client,
            cancelled_at: now(),
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            gateway_ref: None,
        };
        queries::insert_refund(conn, &refund).unwrap();
        refund
    }

    #[test]
    fn test_refund_request_targets_settled_charges() {
        let conn = setup_db();
        seed_refund(&conn);
        let req = refund_request(&conn, "r1").unwrap();
        assert_eq!(req.charge_refs, vec!["ch_1".to_string()]);
        assert_eq!(req.amount, 3000);
    }

    #[test]
    fn test_approve_is_terminal() {
        let conn = setup_db();
        seed_refund(&conn);
        let admin = Actor::admin("admin");
        let out = mark_approved(&conn, &admin, "r1", "re_1", now()).unwrap();
        assert_eq!(out.value.status, RefundStatus::Approved);
        assert_eq!(out.value.reviewed_by.as_deref(), Some("admin"));
        assert_eq!(out.value.gateway_ref.as_deref(), Some("re_1"));
        assert_eq!(out.notifications[0].kind, NotificationKind::RefundApproved);

        let again = reject(&conn, &admin, "r1", "changed my mind", now());
        assert!(matches!(again, Err(AppError::State(StateViolation::RefundNotPending))));
        assert!(matches!(refund_request(&conn, "r1"), Err(AppError::State(_))));
    }

    #[test]
    fn test_reject_requires_reason() {
        let conn = setup_db();
        seed_refund(&conn);
        let admin = Actor::admin("admin");
        assert!(matches!(reject(&conn, &admin, "r1", "  ", now()), Err(AppError::Validation(_))));

        let out = reject(&conn, &admin, "r1", "played the match", now()).unwrap();
        assert_eq!(out.value.status, RefundStatus::Rejected);
        assert_eq!(out.value.rejection_reason.as_deref(), Some("played the match"));
        assert_eq!(out.notifications[0].reason.as_deref(), Some("played the match"));
    }

    #[test]
    fn test_review_leaves_booking_untouched() {
        let conn = setup_db();
        seed_refund(&conn);
        mark_approved(&conn, &Actor::admin("admin"), "r1", "re_1", now()).unwrap();
        let b = queries::get_booking(&conn, "b1").unwrap().unwrap();
        assert_eq!(b.amount_paid, 3000);
    }

    #[test]
    fn test_claimed_refund_cannot_be_rejected() {
        let conn = setup_db();
        seed_refund(&conn);
        let admin = Actor::admin("admin");
        let req = claim_for_approval(&conn, &admin, "r1", now()).unwrap();
        assert_eq!(req.charge_refs, vec!["ch_1".to_string()]);

        let rejected = reject(&conn, &Actor::admin("other"), "r1", "played the match", now());
        assert!(matches!(rejected, Err(AppError::State(StateViolation::RefundInReview))));

        let out = mark_approved(&conn, &admin, "r1", "re_1", now()).unwrap();
        assert_eq!(out.value.status, RefundStatus::Approved);
        let stored = queries::get_refund(&conn, "r1").unwrap().unwrap();
        assert_eq!(stored.status, RefundStatus::Approved);
        assert_eq!(stored.gateway_ref.as_deref(), Some("re_1"));
        assert!(stored.rejection_reason.is_none());
    }

    #[test]
    fn test_released_claim_allows_reject() {
        let conn = setup_db();
        seed_refund(&conn);
        let admin = Actor::admin("admin");
        claim_for_approval(&conn, &admin, "r1", now()).unwrap();
        // Another reviewer's release does not drop the claim.
        release_claim(&conn, &Actor::admin("other"), "r1", now()).unwrap();
        assert!(reject(&conn, &admin, "r1", "played the match", now()).is_err());

        release_claim(&conn, &admin, "r1", now()).unwrap();
        let out = reject(&conn, &admin, "r1", "played the match", now()).unwrap();
        assert_eq!(out.value.status, RefundStatus::Rejected);
        assert!(matches!(
            claim_for_approval(&conn, &admin, "r1", now()),
            Err(AppError::State(StateViolation::RefundNotPending))
        ));
    }

    #[test]
    fn test_lists() {
        let conn = setup_db();
        seed_refund(&conn);
        assert_eq!(list_for_admin(&conn, Some(RefundStatus::Pending)).unwrap().len(), 1);
        assert!(list_for_admin(&conn, Some(RefundStatus::Approved)).unwrap().is_empty());
        assert_eq!(list_for_user(&conn, &Actor::organizer("organizer")).unwrap().len(), 1);
        assert!(list_for_user(&conn, &Actor::organizer("other")).unwrap().is_empty());
    }
}
