//! Service order of a department queue.
//!
//! Patients are ordered by priority (emergency first), then by arrival time (earliest first).
//! Identical priority and arrival time fall back to the token sequence and finally the record
//! id, so the order is total and reproducible for identical inputs.

use crate::patient::Patient;
use std::cmp::Ordering;

/// Compares two patients by service order. `Less` means `a` is served before `b`.
pub fn service_order(a: &Patient, b: &Patient) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.token_sequence.cmp(&b.token_sequence))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts patients in place by [`service_order`].
pub fn sort_queue(patients: &mut [Patient]) {
    patients.sort_by(service_order);
}

/// Returns the patient that would be served first, if any.
pub fn head_of_queue<'a, I>(patients: I) -> Option<&'a Patient>
where
    I: IntoIterator<Item = &'a Patient>,
{
    patients.into_iter().min_by(|a, b| service_order(a, b))
}

/// Number of patients in `queue` that are served before `candidate`.
pub fn ahead_of(queue: &[Patient], candidate: &Patient) -> usize {
    queue
        .iter()
        .filter(|p| service_order(p, candidate) == Ordering::Less)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{PatientStatus, Priority};
    use crate::{NonEmptyText, RecordId};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn patient(seq: u64, priority: Priority, offset_secs: i64) -> Patient {
        Patient {
            id: RecordId::new(),
            name: NonEmptyText::new(format!("Patient {}", seq)).unwrap(),
            age: 40,
            department: "Cardiology".into(),
            token_number: format!("C-{}", seq),
            token_sequence: seq,
            priority,
            status: PatientStatus::Waiting,
            created_at: base_time() + Duration::seconds(offset_secs),
            called_at: None,
            completed_at: None,
            cancelled_at: None,
            estimated_wait_time: 0,
        }
    }

    fn tokens(patients: &[Patient]) -> Vec<&str> {
        patients.iter().map(|p| p.token_number.as_str()).collect()
    }

    #[test]
    fn test_emergency_before_normal_despite_later_arrival() {
        let mut queue = vec![
            patient(23, Priority::Normal, 0),
            patient(24, Priority::Emergency, 60),
        ];
        sort_queue(&mut queue);
        assert_eq!(tokens(&queue), vec!["C-24", "C-23"]);
    }

    #[test]
    fn test_mixed_queue_is_priority_then_arrival() {
        let mut queue = vec![
            patient(1, Priority::Normal, 10),
            patient(2, Priority::Emergency, 50),
            patient(3, Priority::Normal, 5),
            patient(4, Priority::Emergency, 20),
            patient(5, Priority::Normal, 30),
        ];
        sort_queue(&mut queue);
        assert_eq!(tokens(&queue), vec!["C-4", "C-2", "C-3", "C-1", "C-5"]);

        let first_normal = queue
            .iter()
            .position(|p| p.priority == Priority::Normal)
            .unwrap();
        assert!(queue[..first_normal]
            .iter()
            .all(|p| p.priority == Priority::Emergency));
        assert!(queue[first_normal..]
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_identical_arrival_breaks_ties_by_token_sequence() {
        let mut queue = vec![
            patient(9, Priority::Normal, 0),
            patient(7, Priority::Normal, 0),
            patient(8, Priority::Normal, 0),
        ];
        sort_queue(&mut queue);
        assert_eq!(tokens(&queue), vec!["C-7", "C-8", "C-9"]);
    }

    #[test]
    fn test_full_tie_falls_back_to_record_id() {
        let mut a = patient(1, Priority::Normal, 0);
        let mut b = patient(1, Priority::Normal, 0);
        a.id = RecordId::parse("00000000000000000000000000000001").unwrap();
        b.id = RecordId::parse("00000000000000000000000000000002").unwrap();

        let mut forward = vec![a.clone(), b.clone()];
        let mut reverse = vec![b, a];
        sort_queue(&mut forward);
        sort_queue(&mut reverse);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_head_of_queue_and_ahead_of() {
        let queue = vec![
            patient(1, Priority::Normal, 0),
            patient(2, Priority::Normal, 10),
            patient(3, Priority::Emergency, 20),
        ];
        assert_eq!(head_of_queue(&queue).unwrap().token_number, "C-3");
        assert!(head_of_queue(&Vec::<Patient>::new()).is_none());

        let newcomer = patient(4, Priority::Emergency, 30);
        assert_eq!(ahead_of(&queue, &newcomer), 1);
        let normal_newcomer = patient(5, Priority::Normal, 30);
        assert_eq!(ahead_of(&queue, &normal_newcomer), 3);
    }
}
