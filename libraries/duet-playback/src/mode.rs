//! Playback-mode resolution
//!
//! Pure selection of the next/previous queue entry under loop, shuffle and
//! repeat-one. Shuffle keeps no history: a pick may repeat the song that is
//! playing right now.

use crate::types::{PlaybackMode, Song, SongId};
use rand::{thread_rng, Rng};

/// Song that follows `current_id`
///
/// Returns `None` when the queue is empty or `current_id` is not queued.
pub fn resolve_next<'a>(
    queue: &'a [Song],
    current_id: &SongId,
    mode: PlaybackMode,
) -> Option<&'a Song> {
    resolve_next_with_rng(queue, current_id, mode, &mut thread_rng())
}

/// Song that precedes `current_id`
///
/// Returns `None` when the queue is empty or `current_id` is not queued.
pub fn resolve_prev<'a>(
    queue: &'a [Song],
    current_id: &SongId,
    mode: PlaybackMode,
) -> Option<&'a Song> {
    resolve_prev_with_rng(queue, current_id, mode, &mut thread_rng())
}

/// [`resolve_next`] with a caller-supplied random source
pub fn resolve_next_with_rng<'a, R: Rng + ?Sized>(
    queue: &'a [Song],
    current_id: &SongId,
    mode: PlaybackMode,
    rng: &mut R,
) -> Option<&'a Song> {
    let index = position(queue, current_id)?;

    match mode {
        PlaybackMode::RepeatOne => queue.get(index),
        PlaybackMode::Shuffle => random_pick(queue, rng),
        PlaybackMode::Loop => queue.get((index + 1) % queue.len()),
    }
}

/// [`resolve_prev`] with a caller-supplied random source
pub fn resolve_prev_with_rng<'a, R: Rng + ?Sized>(
    queue: &'a [Song],
    current_id: &SongId,
    mode: PlaybackMode,
    rng: &mut R,
) -> Option<&'a Song> {
    let index = position(queue, current_id)?;

    match mode {
        PlaybackMode::Shuffle => random_pick(queue, rng),
        // Repeat-one still steps back: "previous" is an explicit request
        PlaybackMode::Loop | PlaybackMode::RepeatOne => {
            queue.get((index + queue.len() - 1) % queue.len())
        }
    }
}

fn position(queue: &[Song], id: &SongId) -> Option<usize> {
    queue.iter().position(|song| &song.id == id)
}

fn random_pick<'a, R: Rng + ?Sized>(queue: &'a [Song], rng: &mut R) -> Option<&'a Song> {
    if queue.is_empty() {
        return None;
    }
    queue.get(rng.gen_range(0..queue.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn queue(ids: &[&str]) -> Vec<Song> {
        ids.iter().map(|id| Song::new(*id, format!("Song {}", id))).collect()
    }

    #[test]
    fn loop_steps_forward_and_wraps() {
        let q = queue(&["s1", "s2", "s3"]);

        let next = resolve_next(&q, &"s1".into(), PlaybackMode::Loop).unwrap();
        assert_eq!(next.id.as_str(), "s2");

        let wrapped = resolve_next(&q, &"s3".into(), PlaybackMode::Loop).unwrap();
        assert_eq!(wrapped.id.as_str(), "s1");
    }

    #[test]
    fn loop_prev_wraps_to_last() {
        let q = queue(&["s1", "s2", "s3"]);

        let prev = resolve_prev(&q, &"s1".into(), PlaybackMode::Loop).unwrap();
        assert_eq!(prev.id.as_str(), "s3");

        let prev = resolve_prev(&q, &"s2".into(), PlaybackMode::Loop).unwrap();
        assert_eq!(prev.id.as_str(), "s1");
    }

    #[test]
    fn repeat_one_returns_current_for_next_only() {
        let q = queue(&["s1", "s2", "s3"]);

        let next = resolve_next(&q, &"s2".into(), PlaybackMode::RepeatOne).unwrap();
        assert_eq!(next.id.as_str(), "s2");

        let prev = resolve_prev(&q, &"s2".into(), PlaybackMode::RepeatOne).unwrap();
        assert_eq!(prev.id.as_str(), "s1");
    }

    #[test]
    fn shuffle_is_seedable_and_stays_in_queue() {
        let q = queue(&["s1", "s2", "s3", "s4"]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let pick = resolve_next_with_rng(&q, &"s1".into(), PlaybackMode::Shuffle, &mut rng)
                .unwrap();
            assert!(q.contains(pick));
        }
    }

    #[test]
    fn shuffle_can_repeat_current_song() {
        let q = queue(&["s1", "s2"]);
        let mut rng = StdRng::seed_from_u64(1);

        let repeated = (0..200).any(|_| {
            resolve_next_with_rng(&q, &"s1".into(), PlaybackMode::Shuffle, &mut rng)
                .is_some_and(|song| song.id.as_str() == "s1")
        });
        assert!(repeated, "shuffle must not exclude the current song");
    }

    #[test]
    fn empty_queue_or_unknown_id_is_a_no_op() {
        let empty: Vec<Song> = Vec::new();
        assert!(resolve_next(&empty, &"s1".into(), PlaybackMode::Loop).is_none());
        assert!(resolve_prev(&empty, &"s1".into(), PlaybackMode::Shuffle).is_none());

        let q = queue(&["s1", "s2"]);
        assert!(resolve_next(&q, &"missing".into(), PlaybackMode::Loop).is_none());
        assert!(resolve_next(&q, &"missing".into(), PlaybackMode::Shuffle).is_none());
        assert!(resolve_prev(&q, &"missing".into(), PlaybackMode::RepeatOne).is_none());
    }

    #[test]
    fn single_song_queue_loops_onto_itself() {
        let q = queue(&["only"]);
        let next = resolve_next(&q, &"only".into(), PlaybackMode::Loop).unwrap();
        let prev = resolve_prev(&q, &"only".into(), PlaybackMode::Loop).unwrap();
        assert_eq!(next.id.as_str(), "only");
        assert_eq!(prev.id.as_str(), "only");
    }
}
