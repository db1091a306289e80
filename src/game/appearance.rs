//! Player appearance
//!
//! [`Looks`] holds the values a character is drawn with. [`AppearanceBlock`]
//! is the immutable serialized form sent inside the player-info update
//! segment; it is rebuilt from `Looks` whenever the cached copy is dropped.
//!
//! Block layout:
//!
//! ```text
//! flags u8 | title u8 | pk icon u8 | prayer icon u8
//! 12 x slot   (0 for an empty slot, else u16 value | 0x100)
//! 5 x colour u8
//! render animation u16
//! name (terminated string)
//! combat level u8 | total level u16 | sound radius u8
//! ```

use std::sync::Arc;

use rand::Rng;

use crate::game::constants::appearance::*;
use crate::net::buffer::PacketBuffer;

/// Values an appearance block is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Looks {
    pub flags: u8,
    pub title: u8,
    pub pk_icon: u8,
    pub prayer_icon: u8,
    /// Slot values; [`SLOT_NONE`] for an empty slot
    pub body: [u8; 12],
    pub colors: [u8; COLOR_COUNT],
    pub render_anim: u16,
    pub combat_level: u8,
    pub total_level: u16,
    pub sound_radius: u8,
}

impl Default for Looks {
    fn default() -> Self {
        Self {
            flags: 0,
            title: ICON_NONE,
            pk_icon: ICON_NONE,
            prayer_icon: ICON_NONE,
            body: DEFAULT_BODY,
            colors: [0; COLOR_COUNT],
            render_anim: RENDER_ANIM,
            combat_level: COMBAT_LEVEL,
            total_level: TOTAL_LEVEL,
            sound_radius: 0,
        }
    }
}

impl Looks {
    /// Placeholder look: default body styles nudged by 0 or 1, random colours
    pub fn randomized<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut looks = Self::default();
        for slot in looks.body.iter_mut().filter(|s| **s != SLOT_NONE) {
            *slot = slot.saturating_add(rng.gen_range(0..2)).min(SLOT_NONE - 1);
        }
        for color in looks.colors.iter_mut() {
            *color = rng.gen_range(0..COLOR_VARIANTS);
        }
        looks
    }
}

/// Serialized appearance, shared between every viewer's update message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppearanceBlock(Arc<[u8]>);

impl AppearanceBlock {
    pub fn encode(name: &str, looks: &Looks) -> Self {
        let mut buf = PacketBuffer::new();
        buf.write_u8(looks.flags);
        buf.write_u8(looks.title);
        buf.write_u8(looks.pk_icon);
        buf.write_u8(looks.prayer_icon);

        for &slot in &looks.body {
            if slot == SLOT_NONE {
                buf.write_u8(0);
            } else {
                buf.write_u16(slot as u16 | BODY_PART_FLAG);
            }
        }
        for &color in &looks.colors {
            buf.write_u8(color);
        }

        buf.write_u16(looks.render_anim);
        buf.write_str(name);
        buf.write_u8(looks.combat_level);
        buf.write_u16(looks.total_level);
        buf.write_u8(looks.sound_radius);

        Self(buf.into_bytes().into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Walk the slot section, returning each slot's width
    fn slot_widths(bytes: &[u8]) -> Vec<usize> {
        let mut widths = Vec::new();
        let mut at = 4;
        for _ in 0..12 {
            if bytes[at] == 0 {
                widths.push(1);
                at += 1;
            } else {
                assert_eq!(bytes[at], 0x01, "flagged slot must carry the body-part bit");
                widths.push(2);
                at += 2;
            }
        }
        widths
    }

    #[test]
    fn test_default_layout() {
        let block = AppearanceBlock::encode("Zezima", &Looks::default());
        let bytes = block.as_bytes();

        assert_eq!(&bytes[..4], &[0, 255, 255, 255]);
        // hat, cape, amulet, weapon empty; chest 18
        assert_eq!(&bytes[4..10], &[0, 0, 0, 0, 0x01, 18]);
        // 5 empty + 7 styled slots, 5 colours, anim, name, levels, radius
        let expected = 4 + 5 + 7 * 2 + 5 + 2 + "Zezima".len() + 1 + 1 + 2 + 1;
        assert_eq!(block.len(), expected);
        assert_eq!(&bytes[bytes.len() - 4..], &[3, 0, 33, 0]);
    }

    #[test]
    fn test_shape_is_stable_across_randomization() {
        let mut rng = StdRng::seed_from_u64(7);
        let reference = AppearanceBlock::encode("bob", &Looks::default());
        let reference_widths = slot_widths(reference.as_bytes());

        for _ in 0..64 {
            let looks = Looks::randomized(&mut rng);
            let block = AppearanceBlock::encode("bob", &looks);
            assert_eq!(block.len(), reference.len());
            assert_eq!(slot_widths(block.as_bytes()), reference_widths);

            for (slot, base) in looks.body.iter().zip(DEFAULT_BODY) {
                if base == SLOT_NONE {
                    assert_eq!(*slot, SLOT_NONE);
                } else {
                    assert!(*slot == base || *slot == base + 1);
                }
            }
            assert!(looks.colors.iter().all(|c| *c < COLOR_VARIANTS));
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let looks = Looks::randomized(&mut StdRng::seed_from_u64(1));
        assert_eq!(
            AppearanceBlock::encode("a", &looks),
            AppearanceBlock::encode("a", &looks)
        );
    }

    #[test]
    fn test_clone_shares_bytes() {
        let block = AppearanceBlock::encode("a", &Looks::default());
        let copy = block.clone();
        assert!(std::ptr::eq(block.as_bytes(), copy.as_bytes()));
    }
}
