// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use enum_iterator::Sequence;

// From standard library
use std::fmt;
use std::str::FromStr;

// From this library
use crate::boot::BootChooserError;

/// Bootloader types the slot-state interface can sit in front of.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
#[non_exhaustive]
pub enum Bootloader {
    Barebox,
    Grub,
    Uboot,
    Efi,
    Custom,
    /// Records state in memory and acknowledges everything. Testing only.
    Noop,
}

impl Bootloader {
    /// Returns `true` when `name` is a supported bootloader type.
    pub fn is_supported(name: &str) -> bool {
        name.parse::<Bootloader>().is_ok()
    }
}

impl fmt::Display for Bootloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bootloader::Barebox => "barebox",
            Bootloader::Grub => "grub",
            Bootloader::Uboot => "uboot",
            Bootloader::Efi => "efi",
            Bootloader::Custom => "custom",
            Bootloader::Noop => "noop",
        };

        write!(f, "{name}")
    }
}

impl FromStr for Bootloader {
    type Err = BootChooserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "barebox" => Ok(Bootloader::Barebox),
            "grub" => Ok(Bootloader::Grub),
            "uboot" => Ok(Bootloader::Uboot),
            "efi" => Ok(Bootloader::Efi),
            "custom" => Ok(Bootloader::Custom),
            "noop" => Ok(Bootloader::Noop),
            _ => Err(BootChooserError::NotSupported(format!(
                "bootloader type {s:?} not supported"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bootloader_round_trips_config_names() -> crate::Result<()> {
        for bootloader in enum_iterator::all::<Bootloader>() {
            let actual: Bootloader = bootloader.to_string().parse()?;
            let expected = bootloader;
            assert_eq!(actual, expected);
        }

        Ok(())
    }

    #[test]
    fn bootloader_knows_the_supported_set() {
        assert!(Bootloader::is_supported("barebox"));
        assert!(Bootloader::is_supported("grub"));
        assert!(!Bootloader::is_supported("lilo"));
    }
}
