//! Turning received items into item artifacts.

use utylink_bridge::ItemArtifact;
use utylink_protocol::{NetworkItem, SlotId};

use crate::game::{
    ARMOR_POOL, GENERIC_ARMOR, GENERIC_WEAPON, KEY_PIECE_REWARDS, WEAPON_POOL, item_value,
};

/// Assigns artifact ids and game values to received items.
///
/// Items that don't come from a location (starting inventory, server
/// grants) carry negative location ids, often the same one, and would
/// overwrite each other's artifact. They are renumbered to a strictly
/// decreasing sequence instead. The generic weapon and armor items are
/// expanded round-robin into concrete variants.
///
/// State lives for a whole session and is reset on a full replay.
#[derive(Debug, Clone)]
pub struct ItemPlacer {
    /// Most negative id handed out so far.
    floor: i64,
    weapons: usize,
    armors: usize,
}

impl Default for ItemPlacer {
    fn default() -> Self {
        Self {
            floor: -1,
            weapons: 0,
            armors: 0,
        }
    }
}

impl ItemPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn place(&mut self, item: &NetworkItem) -> ItemArtifact {
        let location = if item.location < 0 {
            self.next_negative(item.location)
        } else {
            item.location
        };
        ItemArtifact {
            location,
            player: item.player,
            value: item_value(self.resolve(item.item)),
        }
    }

    fn next_negative(&mut self, location: i64) -> i64 {
        self.floor = if location < self.floor {
            location
        } else {
            self.floor - 1
        };
        self.floor
    }

    fn resolve(&mut self, item: i64) -> i64 {
        match item {
            GENERIC_WEAPON => next_in_pool(&WEAPON_POOL, &mut self.weapons),
            GENERIC_ARMOR => next_in_pool(&ARMOR_POOL, &mut self.armors),
            other => other,
        }
    }
}

fn next_in_pool(pool: &[i64], placed: &mut usize) -> i64 {
    let item = pool[*placed % pool.len()];
    *placed += 1;
    item
}

/// The artifacts unlocked by collecting enough key pieces.
pub fn key_piece_rewards() -> [ItemArtifact; 2] {
    KEY_PIECE_REWARDS.map(|(location, item)| ItemArtifact {
        location,
        player: SlotId(0),
        value: item_value(item),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(item: i64, location: i64) -> NetworkItem {
        NetworkItem {
            item,
            location,
            player: SlotId(2),
            flags: 0,
        }
    }

    #[test]
    fn test_regular_item_keeps_location() {
        let mut placer = ItemPlacer::new();
        let art = placer.place(&item(77_508, 12_010));
        assert_eq!(art.location, 12_010);
        assert_eq!(art.player, SlotId(2));
        assert_eq!(art.value, 66_508);
    }

    #[test]
    fn test_weapon_round_robin_wraps() {
        let mut placer = ItemPlacer::new();
        let picked: Vec<i64> = (0..9)
            .map(|n| placer.place(&item(GENERIC_WEAPON, 12_000 + n)).value)
            .map(|v| WEAPON_POOL.iter().position(|w| item_value(*w) == v).unwrap() as i64)
            .collect();
        assert_eq!(picked, vec![0, 1, 2, 3, 4, 5, 6, 7, 0]);
    }

    #[test]
    fn test_armor_counter_is_independent_of_weapons() {
        let mut placer = ItemPlacer::new();
        placer.place(&item(GENERIC_WEAPON, 1));
        placer.place(&item(GENERIC_WEAPON, 2));
        assert_eq!(placer.place(&item(GENERIC_ARMOR, 3)).value, item_value(97_509));
        for _ in 1..ARMOR_POOL.len() {
            placer.place(&item(GENERIC_ARMOR, 4));
        }
        assert_eq!(placer.place(&item(GENERIC_ARMOR, 5)).value, item_value(97_509));
    }

    #[test]
    fn test_negative_locations_never_collide() {
        let mut placer = ItemPlacer::new();
        let ids: Vec<i64> = [-1, -1, -2, -10, -4, -1]
            .into_iter()
            .map(|loc| placer.place(&item(77_001, loc)).location)
            .collect();
        assert_eq!(ids, vec![-2, -3, -4, -10, -11, -12]);
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let mut placer = ItemPlacer::new();
        placer.place(&item(GENERIC_WEAPON, -1));
        placer.reset();
        let art = placer.place(&item(GENERIC_WEAPON, -1));
        assert_eq!(art.location, -2);
        assert_eq!(art.value, item_value(WEAPON_POOL[0]));
    }

    #[test]
    fn test_key_piece_rewards() {
        let [a, b] = key_piece_rewards();
        assert_eq!(a.file_name(), "-99999PLR0.item");
        assert_eq!(a.value, 66_787);
        assert_eq!(b.file_name(), "-99998PLR0.item");
        assert_eq!(b.value, 66_789);
    }
}
