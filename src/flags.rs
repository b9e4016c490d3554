use crate::error::{Error, ErrorList};
use bitflags::bitflags;

/******************************
 *
 * Block Control Flags
 *
 ******************************/

pub type BlockControlFlagsType = u64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockControlFlags: BlockControlFlagsType {
        /// This block must be replicated in every fragment.
        const BLOCK_REPLICATE = 0x01;
        /// Transmission of a status report is requested if this block can't be processed.
        const BLOCK_STATUS_REPORT = 0x02;

        /// Bundle must be deleted if this block can't be processed.
        const BLOCK_DELETE_BUNDLE = 0x04;

        /// Block must be removed from the bundle if it can't be processed.
        const BLOCK_REMOVE = 0x10;
    }
}

/// Named access to a raw block control flag word. Unnamed bits are carried along untouched.
///
/// Both flag words are plain `u64`, the method names differ from
/// [`BundleValidation`] so both traits can be in scope at once.
pub trait BlockFlagsAccess {
    fn block_flags(&self) -> BlockControlFlags;
    fn has_block_flag(&self, flags: BlockControlFlags) -> bool {
        self.block_flags().contains(flags)
    }
    fn set_block_flag(&mut self, flags: BlockControlFlags, value: bool);
}

impl BlockFlagsAccess for BlockControlFlagsType {
    fn block_flags(&self) -> BlockControlFlags {
        BlockControlFlags::from_bits_retain(*self)
    }
    fn set_block_flag(&mut self, flags: BlockControlFlags, value: bool) {
        let mut f = self.block_flags();
        f.set(flags, value);
        *self = f.bits();
    }
}

/******************************
 *
 * Bundle Control Flags
 *
 ******************************/

pub type BundleControlFlagsType = u64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BundleControlFlags: BundleControlFlagsType {

/// Request reporting of bundle deletion.
    const BUNDLE_STATUS_REQUEST_DELETION = 0x0004_0000;

/// Request reporting of bundle delivery.
    const BUNDLE_STATUS_REQUEST_DELIVERY = 0x0002_0000;

/// Request reporting of bundle forwarding.
    const BUNDLE_STATUS_REQUEST_FORWARD = 0x0001_0000;

/// Request reporting of bundle reception.
    const BUNDLE_STATUS_REQUEST_RECEPTION = 0x0000_4000;

/// Status time is requested in all status reports.
    const BUNDLE_REQUEST_STATUS_TIME = 0x0040;

///Acknowledgment by the user application is requested.
    const BUNDLE_REQUEST_USER_APPLICATION_ACK = 0x0020;

/// The bundle must not be fragmented.
    const BUNDLE_MUST_NOT_FRAGMENTED = 0x0004;

/// The bundle's payload is an administrative record.
    const BUNDLE_ADMINISTRATIVE_RECORD_PAYLOAD = 0x0002;

/// The bundle is a fragment.
    const BUNDLE_IS_FRAGMENT = 0x0001;
    }
}

impl BundleControlFlags {
    pub const STATUS_REQUESTS: BundleControlFlags =
        BundleControlFlags::BUNDLE_STATUS_REQUEST_RECEPTION
            .union(BundleControlFlags::BUNDLE_STATUS_REQUEST_FORWARD)
            .union(BundleControlFlags::BUNDLE_STATUS_REQUEST_DELIVERY)
            .union(BundleControlFlags::BUNDLE_STATUS_REQUEST_DELETION);
}

pub trait BundleValidation {
    fn flags(&self) -> BundleControlFlags;
    fn has(&self, flags: BundleControlFlags) -> bool {
        self.flags().contains(flags)
    }
    fn set_flag(&mut self, flags: BundleControlFlags, value: bool);

    /// Checks flag combinations forbidden by RFC 9171 4.2.3. Reserved bits are ignored.
    fn validate(&self) -> Result<(), ErrorList> {
        let mut errors: ErrorList = Vec::new();
        let flags = self.flags();
        if flags.contains(BundleControlFlags::BUNDLE_IS_FRAGMENT)
            && flags.contains(BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED)
        {
            errors.push(Error::BundleControlFlagsError(
                "Both 'bundle is a fragment' and 'bundle must not be fragmented' flags are set"
                    .to_string(),
            ));
        }
        if flags.contains(BundleControlFlags::BUNDLE_ADMINISTRATIVE_RECORD_PAYLOAD)
            && flags.intersects(BundleControlFlags::STATUS_REQUESTS)
        {
            errors.push(Error::BundleControlFlagsError(
                "\"payload is administrative record => no status report request flags\" failed"
                    .to_string(),
            ))
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(())
    }
}

impl BundleValidation for BundleControlFlagsType {
    fn flags(&self) -> BundleControlFlags {
        BundleControlFlags::from_bits_retain(*self)
    }
    fn set_flag(&mut self, flags: BundleControlFlags, value: bool) {
        let mut f = self.flags();
        f.set(flags, value);
        *self = f.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_bits_are_kept() {
        let mut raw: BundleControlFlagsType = 0x8000_0000_0000_0100;
        raw.set_flag(BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED, true);
        assert_eq!(raw, 0x8000_0000_0000_0104);
        raw.set_flag(BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED, false);
        assert_eq!(raw, 0x8000_0000_0000_0100);
        assert!(raw.validate().is_ok());

        let mut blk: BlockControlFlagsType = 0xe0;
        blk.set_block_flag(BlockControlFlags::BLOCK_REPLICATE, true);
        assert_eq!(blk, 0xe1);
        assert!(blk.has_block_flag(BlockControlFlags::BLOCK_REPLICATE));
    }

    #[test]
    fn conflicting_bundle_flags() {
        let raw: BundleControlFlagsType = (BundleControlFlags::BUNDLE_IS_FRAGMENT
            | BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED)
            .bits();
        assert_eq!(raw.validate().unwrap_err().len(), 1);

        let raw: BundleControlFlagsType = (BundleControlFlags::BUNDLE_ADMINISTRATIVE_RECORD_PAYLOAD
            | BundleControlFlags::BUNDLE_STATUS_REQUEST_DELIVERY)
            .bits();
        assert_eq!(raw.validate().unwrap_err().len(), 1);

        let raw: BundleControlFlagsType = (BundleControlFlags::BUNDLE_ADMINISTRATIVE_RECORD_PAYLOAD
            | BundleControlFlags::BUNDLE_REQUEST_STATUS_TIME)
            .bits();
        assert!(raw.validate().is_ok());
    }
}
