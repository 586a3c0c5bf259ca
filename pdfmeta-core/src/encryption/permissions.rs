//! PDF permissions according to ISO 32000-1 Table 22

use bitflags::bitflags;

bitflags! {
    /// What the document's security handler allows a user-password reader to do
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct Permissions: u32 {
        const OK_TO_PRINT = 1 << 0;
        const OK_TO_MODIFY = 1 << 1;
        const OK_TO_COPY = 1 << 2;
        const OK_TO_ADD_NOTES = 1 << 3;
        const OK_TO_FILL_FORM = 1 << 4;
        /// Extract text and graphics for accessibility
        const OK_TO_EXTRACT_CONTENTS = 1 << 5;
        /// Insert, rotate and delete pages
        const OK_TO_ASSEMBLE = 1 << 6;
        const OK_TO_PRINT_HIGH_RESOLUTION = 1 << 7;

        const FULL = Self::OK_TO_PRINT.bits()
            | Self::OK_TO_MODIFY.bits()
            | Self::OK_TO_COPY.bits()
            | Self::OK_TO_ADD_NOTES.bits()
            | Self::OK_TO_FILL_FORM.bits()
            | Self::OK_TO_EXTRACT_CONTENTS.bits()
            | Self::OK_TO_ASSEMBLE.bits()
            | Self::OK_TO_PRINT_HIGH_RESOLUTION.bits();
    }
}

/// `/P` bit (1-based, as numbered in Table 22) for each permission
const P_BITS: [(u32, Permissions); 8] = [
    (3, Permissions::OK_TO_PRINT),
    (4, Permissions::OK_TO_MODIFY),
    (5, Permissions::OK_TO_COPY),
    (6, Permissions::OK_TO_ADD_NOTES),
    (9, Permissions::OK_TO_FILL_FORM),
    (10, Permissions::OK_TO_EXTRACT_CONTENTS),
    (11, Permissions::OK_TO_ASSEMBLE),
    (12, Permissions::OK_TO_PRINT_HIGH_RESOLUTION),
];

impl Permissions {
    /// Decode a `/P` value for a handler of the given revision.
    ///
    /// Revision 2 has no bits 9-12; those permissions follow the older bit that
    /// used to cover them.
    pub fn from_p_value(p: i32, revision: i64) -> Self {
        let bits = p as u32;
        let set = |bit: u32| bits & (1 << (bit - 1)) != 0;

        let mut permissions = Permissions::empty();
        for (bit, flag) in P_BITS {
            if set(bit) {
                permissions |= flag;
            }
        }

        if revision < 3 {
            permissions.set(Permissions::OK_TO_FILL_FORM, set(6));
            permissions.set(Permissions::OK_TO_EXTRACT_CONTENTS, set(5));
            permissions.set(Permissions::OK_TO_ASSEMBLE, set(4));
            permissions.set(Permissions::OK_TO_PRINT_HIGH_RESOLUTION, set(3));
        }
        permissions
    }

    /// Encode as a `/P` value: reserved bits 7-8 and 13-32 set, bits 1-2 clear.
    pub fn to_p_value(self) -> i32 {
        let mut bits: u32 = 0xFFFF_F0C0;
        for (bit, flag) in P_BITS {
            if self.contains(flag) {
                bits |= 1 << (bit - 1);
            }
        }
        bits as i32
    }

    pub fn can_print(&self) -> bool {
        self.contains(Permissions::OK_TO_PRINT)
    }

    pub fn can_copy(&self) -> bool {
        self.contains(Permissions::OK_TO_COPY)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::FULL
    }
}
