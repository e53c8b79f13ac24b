//! Numbering conventions shared with the game-side patch.

/// Game name as registered with the server.
pub const GAME: &str = "Undertale Yellow";

/// Server location ids are the game's local ids plus this offset.
pub const LOCATION_OFFSET: i64 = 12_000;

/// Item artifact content is the server item id minus this offset.
pub const ITEM_OFFSET: i64 = 11_000;

/// Placeholder item that stands for "some weapon".
pub const GENERIC_WEAPON: i64 = 97_508;
/// Concrete weapons the placeholder cycles through, in order.
pub const WEAPON_POOL: [i64; 8] = [97_520, 97_521, 97_522, 97_523, 97_524, 97_525, 97_526, 97_527];

/// Placeholder item that stands for "some armor".
pub const GENERIC_ARMOR: i64 = 97_507;
pub const ARMOR_POOL: [i64; 11] = [
    97_509, 97_510, 97_511, 97_512, 97_513, 97_514, 97_515, 97_516, 97_517, 97_518, 97_519,
];

/// Counted toward the key-hunt threshold.
pub const KEY_PIECE: i64 = 77_000;

/// Item artifacts granted once enough key pieces have arrived, as
/// `(artifact location, item id)`.
pub const KEY_PIECE_REWARDS: [(i64, i64); 2] = [(-99_999, 77_787), (-99_998, 77_789)];

/// Capability tags.
pub const TAG_AP: &str = "AP";
pub const TAG_ONLINE: &str = "Online";
pub const TAG_DEATHLINK: &str = "DeathLink";

/// Longest hint preview the game will display.
pub const HINT_PREVIEW_CHARS: usize = 20;

/// Server location id → local id.
pub fn to_local(location: i64) -> i64 {
    location - LOCATION_OFFSET
}

/// Local location id → server id.
pub fn to_global(location: i64) -> i64 {
    location + LOCATION_OFFSET
}

/// Server item id → value written into an item artifact.
pub fn item_value(item: i64) -> i64 {
    item - ITEM_OFFSET
}
