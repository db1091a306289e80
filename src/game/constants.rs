//! Game constants shared by the lifecycle and update encoders
//!
//! Interface ids, component offsets and the tab table are fixed by the client
//! and must not be changed independently of it.

/// Tick timing
pub mod tick {
    /// Length of one game tick in milliseconds
    pub const DURATION_MS: u64 = 600;
}

/// Player identity range
pub mod players {
    /// Identity slots reserved by the update format (index 0 is never used)
    pub const MAX_PLAYERS: usize = 2048;
    /// Lowest assignable identity
    pub const FIRST_ID: u16 = 1;
    /// Highest assignable identity
    pub const LAST_ID: u16 = (MAX_PLAYERS - 1) as u16;
    /// Most entities one client tracks in detail
    pub const MAX_TRACKED: usize = 255;
    /// Tracked entities further than this (or on another plane) are out of view
    pub const VIEW_DISTANCE: i32 = 15;
    /// Update-block bytes one player info message may carry; the rest wait a tick
    pub const UPDATE_BLOCK_BUDGET: usize = 40_000;
}

/// Map region constants
pub mod map {
    /// Default base-area edge length in tiles
    pub const BASE_AREA_SIZE: i32 = 104;
    /// Default spawn (x, z, plane)
    pub const SPAWN: (i32, i32, u8) = (3162, 3490, 0);
}

/// Interface ids and component layout
pub mod interfaces {
    /// Game frame for the fixed-size client
    pub const GAME_FRAME_FIXED: u16 = 548;
    /// Game frame for resizable and fullscreen clients
    pub const GAME_FRAME_RESIZABLE: u16 = 746;
    /// Chat box composite root
    pub const CHAT_BOX: u16 = 752;
    /// Chat box options strip
    pub const CHAT_OPTIONS: u16 = 751;
    /// Chat box message history
    pub const CHAT_HISTORY: u16 = 137;

    /// Components the chat box lands on in the fixed frame
    pub const FIXED_CHAT_OPTIONS_COMPONENT: u16 = 20;
    pub const FIXED_CHAT_BOX_COMPONENT: u16 = 142;
    /// Components the chat box lands on in the resizable frame
    pub const RESIZABLE_CHAT_OPTIONS_COMPONENT: u16 = 15;
    pub const RESIZABLE_CHAT_BOX_COMPONENT: u16 = 18;
    /// Component of the chat box hosting the message history (resizable only)
    pub const CHAT_HISTORY_COMPONENT: u16 = 9;

    /// First tab component in each frame
    pub const FIXED_TAB_BASE: u16 = 152;
    pub const RESIZABLE_TAB_BASE: u16 = 33;

    /// Flags sent with every sub-interface open on login
    pub const DEFAULT_OPEN_FLAGS: u8 = 3;

    /// Tab id -> interface id
    pub const TABS: [(u16, u16); 17] = [
        (0, 884),  // combat styles
        (1, 320),  // skills
        (2, 190),  // quests
        (3, 259),  // achievements
        (4, 149),  // inventory
        (5, 387),  // equipment
        (6, 271),  // prayer
        (7, 192),  // spellbook
        (8, 891),  // clan
        (9, 550),  // friends
        (10, 551), // ignores
        (11, 589), // clan chat
        (12, 261), // settings
        (13, 464), // emotes
        (14, 187), // music
        (15, 34),  // notes
        (16, 182), // logout
    ];
}

/// Appearance defaults
pub mod appearance {
    /// Slot value meaning "nothing worn, no body part"
    pub const SLOT_NONE: u8 = 255;
    /// Icon value meaning "no icon"
    pub const ICON_NONE: u8 = 255;
    /// Marks a slot value as a body-part style rather than an item
    pub const BODY_PART_FLAG: u16 = 0x100;
    /// hat, cape, amulet, weapon, chest, shield, arms, legs, hair, wrists, hands, feet
    pub const DEFAULT_BODY: [u8; 12] = [255, 255, 255, 255, 18, 255, 26, 36, 0, 33, 42, 10];
    /// Render animation set
    pub const RENDER_ANIM: u16 = 1426;
    pub const COMBAT_LEVEL: u8 = 3;
    pub const TOTAL_LEVEL: u16 = 33;
    pub const COLOR_COUNT: usize = 5;
    /// Number of colour variants per palette slot used for placeholder looks
    pub const COLOR_VARIANTS: u8 = 4;
}
