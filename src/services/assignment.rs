//! Fairness-constrained content assignment.
//!
//! Pure functions over in-memory inputs; every random draw goes through the
//! injected [`Rng`] so uniqueness and pairing properties are testable with a
//! seeded generator. The minimum fairness contract is uniform random without
//! replacement plus the duel opposing-team pairing constraint; no further
//! balancing heuristic is applied.

use indexmap::IndexMap;
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{EventEntity, MissionEntity, PlayerEntity, PlayerPlaceholder};

/// Token substituted with a player name at assignment time.
const PLAYER_TOKEN: &str = "{player}";

/// One drawn mission together with its frozen resolved text.
#[derive(Debug, Clone)]
pub struct AssignedMission {
    /// Catalog mission that was drawn.
    pub mission: MissionEntity,
    /// Text with the `{player}` token substituted, frozen at draw time.
    pub resolved_text: String,
}

/// Errors raised by the assignment engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    /// The pool cannot cover the required number of draws.
    #[error("pool of {available} missions cannot cover {required} draws")]
    InsufficientPool {
        /// Draws the roster requires.
        required: usize,
        /// Missions the pool offers.
        available: usize,
    },
    /// A placeholder has no player to resolve against.
    #[error("no eligible player to resolve `{placeholder:?}` for {player}")]
    NoEligiblePlayer {
        /// Placeholder that failed to resolve.
        placeholder: PlayerPlaceholder,
        /// Name of the player holding the mission.
        player: String,
    },
}

/// Draw one distinct mission per player, pairing duel missions across
/// opposing teams.
///
/// A duel mission is materialized as two assignments of the same catalog
/// entry whose resolved texts reference the respective partner. Duel
/// missions that cannot be paired (no unassigned opponent left) are set
/// aside and the draw continues with the next mission.
pub fn assign_direct<R: Rng>(
    players: &[PlayerEntity],
    pool: &[MissionEntity],
    rng: &mut R,
) -> Result<IndexMap<Uuid, AssignedMission>, AssignError> {
    if pool.len() < players.len() {
        return Err(AssignError::InsufficientPool {
            required: players.len(),
            available: pool.len(),
        });
    }

    let mut deck = pool.to_vec();
    deck.shuffle(rng);

    let mut order: Vec<&PlayerEntity> = players.iter().collect();
    order.shuffle(rng);

    let mut assigned: IndexMap<Uuid, AssignedMission> = IndexMap::new();

    for &player in &order {
        if assigned.contains_key(&player.id) {
            continue;
        }

        loop {
            let Some(mission) = deck.pop() else {
                // Unpairable duels shrank the usable pool below the roster.
                return Err(AssignError::InsufficientPool {
                    required: players.len(),
                    available: pool.len(),
                });
            };

            if mission.placeholder == PlayerPlaceholder::Duel {
                let partner = order
                    .iter()
                    .find(|candidate| {
                        !assigned.contains_key(&candidate.id)
                            && candidate.id != player.id
                            && player.team.opponent() == Some(candidate.team)
                    })
                    .copied();

                let Some(partner) = partner else {
                    continue;
                };

                let (text_a, text_b) = resolve_duel_pair(&mission, player, partner);
                assigned.insert(
                    player.id,
                    AssignedMission {
                        mission: mission.clone(),
                        resolved_text: text_a,
                    },
                );
                assigned.insert(
                    partner.id,
                    AssignedMission {
                        mission,
                        resolved_text: text_b,
                    },
                );
                break;
            }

            let resolved_text = resolve_placeholder(&mission, player, players, rng)?;
            assigned.insert(
                player.id,
                AssignedMission {
                    mission,
                    resolved_text,
                },
            );
            break;
        }
    }

    Ok(assigned)
}

/// Draw `k` distinct missions per team-rostered player.
///
/// Duel missions are excluded: they require pairing and are unsuited to an
/// independent pick. Offers never overlap, neither within one player nor
/// across players.
pub fn assign_choices<R: Rng>(
    players: &[PlayerEntity],
    pool: &[MissionEntity],
    k: usize,
    rng: &mut R,
) -> Result<IndexMap<Uuid, Vec<AssignedMission>>, AssignError> {
    let rostered: Vec<&PlayerEntity> = players
        .iter()
        .filter(|player| player.team.is_rostered())
        .collect();

    let mut deck: Vec<MissionEntity> = pool
        .iter()
        .filter(|mission| mission.placeholder != PlayerPlaceholder::Duel)
        .cloned()
        .collect();

    let required = rostered.len() * k;
    if deck.len() < required {
        return Err(AssignError::InsufficientPool {
            required,
            available: deck.len(),
        });
    }

    deck.shuffle(rng);

    let mut offers: IndexMap<Uuid, Vec<AssignedMission>> = IndexMap::new();
    for player in rostered {
        let mut drawn = Vec::with_capacity(k);
        for _ in 0..k {
            let mission = deck.pop().expect("deck size checked above");
            let resolved_text = resolve_placeholder(&mission, player, players, rng)?;
            drawn.push(AssignedMission {
                mission,
                resolved_text,
            });
        }
        offers.insert(player.id, drawn);
    }

    Ok(offers)
}

/// Substitute the `{player}` token for a non-duel mission.
///
/// Resolution happens once; the returned string is frozen into the
/// assignment row and never recomputed, so later roster changes cannot
/// invalidate it.
pub fn resolve_placeholder<R: Rng>(
    mission: &MissionEntity,
    player: &PlayerEntity,
    roster: &[PlayerEntity],
    rng: &mut R,
) -> Result<String, AssignError> {
    let eligible: Vec<&PlayerEntity> = match mission.placeholder {
        PlayerPlaceholder::None => return Ok(mission.text.clone()),
        PlayerPlaceholder::Any => roster.iter().filter(|other| other.id != player.id).collect(),
        PlayerPlaceholder::Teammate => roster
            .iter()
            .filter(|other| other.id != player.id && other.team == player.team)
            .collect(),
        PlayerPlaceholder::Opponent => roster
            .iter()
            .filter(|other| Some(other.team) == player.team.opponent())
            .collect(),
        // Duels resolve through their pairing, never through the roster.
        PlayerPlaceholder::Duel => Vec::new(),
    };

    let target = eligible
        .choose(rng)
        .ok_or_else(|| AssignError::NoEligiblePlayer {
            placeholder: mission.placeholder,
            player: player.name.clone(),
        })?;

    Ok(substitute(&mission.text, &target.name))
}

/// Resolve both sides of a duel mission so each text references the partner.
pub fn resolve_duel_pair(
    mission: &MissionEntity,
    player: &PlayerEntity,
    partner: &PlayerEntity,
) -> (String, String) {
    (
        substitute(&mission.text, &partner.name),
        substitute(&mission.text, &player.name),
    )
}

/// Draw `count` distinct catalog events and schedule each at a uniform
/// random offset inside `window_secs`, sorted by schedule.
pub fn schedule_events<R: Rng>(
    catalog: &[EventEntity],
    count: usize,
    window_secs: std::ops::Range<u64>,
    rng: &mut R,
) -> Vec<(EventEntity, u64)> {
    let mut scheduled: Vec<(EventEntity, u64)> = catalog
        .choose_multiple(rng, count.min(catalog.len()))
        .map(|event| {
            let at = if window_secs.is_empty() {
                window_secs.start
            } else {
                rng.random_range(window_secs.clone())
            };
            (event.clone(), at)
        })
        .collect();

    scheduled.sort_by_key(|(_, at)| *at);
    scheduled
}

/// Draw the victory bonus from the configured inclusive range.
pub fn draw_bonus_points<R: Rng>(range: std::ops::RangeInclusive<i32>, rng: &mut R) -> i32 {
    if range.start() >= range.end() {
        return *range.start();
    }
    rng.random_range(range)
}

fn substitute(text: &str, name: &str) -> String {
    text.replace(PLAYER_TOKEN, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{MissionKind, TeamSide};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn player(name: &str, team: TeamSide) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            team,
            token: format!("tok-{name}"),
        }
    }

    fn mission(text: &str, placeholder: PlayerPlaceholder) -> MissionEntity {
        MissionEntity {
            id: Uuid::new_v4(),
            kind: MissionKind::Mid,
            category: "social".into(),
            difficulty: 2,
            points: 3,
            is_private: false,
            maps: Vec::new(),
            text: text.into(),
            placeholder,
        }
    }

    fn four_players() -> Vec<PlayerEntity> {
        vec![
            player("Ana", TeamSide::Red),
            player("Bob", TeamSide::Red),
            player("Cleo", TeamSide::Blue),
            player("Dan", TeamSide::Blue),
        ]
    }

    #[test]
    fn direct_draw_is_a_bijection_over_distinct_missions() {
        let players = four_players();
        let pool: Vec<MissionEntity> = (0..5)
            .map(|i| mission(&format!("mission {i}"), PlayerPlaceholder::None))
            .collect();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = assign_direct(&players, &pool, &mut rng).unwrap();

            assert_eq!(assigned.len(), players.len());
            let distinct: HashSet<Uuid> =
                assigned.values().map(|entry| entry.mission.id).collect();
            assert_eq!(distinct.len(), players.len());
        }
    }

    #[test]
    fn duel_missions_pair_opposing_players_reciprocally() {
        let players = four_players();
        let mut pool = vec![mission("Challenge {player} to arm wrestling", PlayerPlaceholder::Duel)];
        pool.extend((0..4).map(|i| mission(&format!("solo {i}"), PlayerPlaceholder::None)));

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = assign_direct(&players, &pool, &mut rng).unwrap();

            let holders: Vec<&PlayerEntity> = players
                .iter()
                .filter(|p| assigned[&p.id].mission.placeholder == PlayerPlaceholder::Duel)
                .collect();

            if holders.is_empty() {
                // The duel card may stay undrawn for this seed.
                continue;
            }

            assert_eq!(holders.len(), 2, "a duel always lands on exactly two players");
            let [a, b] = holders[..] else { unreachable!() };
            assert_eq!(a.team.opponent(), Some(b.team));
            assert_eq!(assigned[&a.id].mission.id, assigned[&b.id].mission.id);
            assert!(assigned[&a.id].resolved_text.contains(&b.name));
            assert!(assigned[&b.id].resolved_text.contains(&a.name));
        }
    }

    #[test]
    fn unpairable_duel_is_set_aside() {
        // A single-team roster can never pair a duel.
        let players = vec![player("Ana", TeamSide::Red), player("Bob", TeamSide::Red)];
        let pool = vec![
            mission("Challenge {player}", PlayerPlaceholder::Duel),
            mission("solo 0", PlayerPlaceholder::None),
            mission("solo 1", PlayerPlaceholder::None),
        ];

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = assign_direct(&players, &pool, &mut rng).unwrap();
            assert!(assigned
                .values()
                .all(|entry| entry.mission.placeholder != PlayerPlaceholder::Duel));
        }
    }

    #[test]
    fn exhausted_deck_fails_loud_rather_than_under_assigning() {
        // Two players, two missions, but the duel is unusable: the draw must
        // report the pool as insufficient instead of assigning one player.
        let players = vec![player("Ana", TeamSide::Red), player("Bob", TeamSide::Red)];
        let pool = vec![
            mission("Challenge {player}", PlayerPlaceholder::Duel),
            mission("solo 0", PlayerPlaceholder::None),
        ];

        let mut rng = StdRng::seed_from_u64(7);
        let err = assign_direct(&players, &pool, &mut rng).unwrap_err();
        assert!(matches!(err, AssignError::InsufficientPool { required: 2, .. }));
    }

    #[test]
    fn small_pool_is_rejected_upfront() {
        let players = four_players();
        let pool = vec![mission("only one", PlayerPlaceholder::None)];
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            assign_direct(&players, &pool, &mut rng).unwrap_err(),
            AssignError::InsufficientPool {
                required: 4,
                available: 1,
            }
        );
    }

    #[test]
    fn choices_are_disjoint_and_exclude_duels() {
        let mut players = four_players();
        players.push(player("Eve", TeamSide::Unassigned));

        let mut pool: Vec<MissionEntity> = (0..8)
            .map(|i| mission(&format!("pick {i}"), PlayerPlaceholder::None))
            .collect();
        pool.push(mission("Challenge {player}", PlayerPlaceholder::Duel));

        let mut rng = StdRng::seed_from_u64(3);
        let offers = assign_choices(&players, &pool, 2, &mut rng).unwrap();

        // Only the four rostered players receive offers.
        assert_eq!(offers.len(), 4);
        assert!(!offers.contains_key(&players[4].id));

        let mut seen: HashSet<Uuid> = HashSet::new();
        for drawn in offers.values() {
            assert_eq!(drawn.len(), 2);
            for entry in drawn {
                assert_ne!(entry.mission.placeholder, PlayerPlaceholder::Duel);
                assert!(seen.insert(entry.mission.id), "offers must not overlap");
            }
        }
    }

    #[test]
    fn choice_pool_must_cover_roster_times_k() {
        let players = four_players();
        let pool: Vec<MissionEntity> = (0..7)
            .map(|i| mission(&format!("pick {i}"), PlayerPlaceholder::None))
            .collect();

        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            assign_choices(&players, &pool, 2, &mut rng).unwrap_err(),
            AssignError::InsufficientPool {
                required: 8,
                available: 7,
            }
        );
    }

    #[test]
    fn placeholder_resolution_respects_team_scopes() {
        let players = four_players();
        let ana = &players[0];
        let mut rng = StdRng::seed_from_u64(11);

        let none = mission("no token here", PlayerPlaceholder::None);
        assert_eq!(
            resolve_placeholder(&none, ana, &players, &mut rng).unwrap(),
            "no token here"
        );

        for _ in 0..10 {
            let teammate = mission("High-five {player}", PlayerPlaceholder::Teammate);
            let text = resolve_placeholder(&teammate, ana, &players, &mut rng).unwrap();
            assert_eq!(text, "High-five Bob");

            let opponent = mission("Stare down {player}", PlayerPlaceholder::Opponent);
            let text = resolve_placeholder(&opponent, ana, &players, &mut rng).unwrap();
            assert!(text == "Stare down Cleo" || text == "Stare down Dan");

            let any = mission("Imitate {player}", PlayerPlaceholder::Any);
            let text = resolve_placeholder(&any, ana, &players, &mut rng).unwrap();
            assert!(!text.contains("Ana"));
            assert!(!text.contains(PLAYER_TOKEN));
        }
    }

    #[test]
    fn placeholder_without_candidates_is_an_error() {
        let lonely = vec![player("Ana", TeamSide::Red)];
        let teammate = mission("High-five {player}", PlayerPlaceholder::Teammate);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            resolve_placeholder(&teammate, &lonely[0], &lonely, &mut rng).unwrap_err(),
            AssignError::NoEligiblePlayer { .. }
        ));
    }

    #[test]
    fn event_schedule_stays_inside_the_window() {
        let catalog: Vec<EventEntity> = (0..5)
            .map(|i| EventEntity {
                id: Uuid::new_v4(),
                name: format!("event {i}"),
                text: "do the thing".into(),
                points: 5,
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(9);
        let scheduled = schedule_events(&catalog, 3, 300..900, &mut rng);

        assert_eq!(scheduled.len(), 3);
        let ids: HashSet<Uuid> = scheduled.iter().map(|(event, _)| event.id).collect();
        assert_eq!(ids.len(), 3);
        for (_, at) in &scheduled {
            assert!((300..900).contains(at));
        }
        assert!(scheduled.windows(2).all(|pair| pair[0].1 <= pair[1].1));

        // Count is capped by the catalog size.
        let few = schedule_events(&catalog, 10, 300..900, &mut rng);
        assert_eq!(few.len(), 5);
    }

    #[test]
    fn bonus_draw_is_bounded() {
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..50 {
            let bonus = draw_bonus_points(5..=20, &mut rng);
            assert!((5..=20).contains(&bonus));
        }
        assert_eq!(draw_bonus_points(7..=7, &mut rng), 7);
    }

    #[test]
    fn same_seed_reproduces_the_same_draw() {
        let players = four_players();
        let pool: Vec<MissionEntity> = (0..6)
            .map(|i| mission(&format!("mission {i}"), PlayerPlaceholder::None))
            .collect();

        let first = assign_direct(&players, &pool, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = assign_direct(&players, &pool, &mut StdRng::seed_from_u64(42)).unwrap();

        for (id, entry) in &first {
            assert_eq!(second[id].mission.id, entry.mission.id);
            assert_eq!(second[id].resolved_text, entry.resolved_text);
        }
    }
}
