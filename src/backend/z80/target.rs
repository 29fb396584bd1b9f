//! Platform variants the Z80 backend can target. A target affects only
//! the entry address and the console/screen helper routines it emits,
//! never the MIR it is given.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    ZxSpectrum,
    Cpm,
    Msx,
    Cpc,
}

impl Target {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "zx" | "zxspectrum" | "zx_spectrum" => Some(Target::ZxSpectrum),
            "cpm" => Some(Target::Cpm),
            "msx" => Some(Target::Msx),
            "cpc" => Some(Target::Cpc),
            _ => None,
        }
    }

    pub fn entry_address(self) -> u16 {
        match self {
            Target::ZxSpectrum => 0x8000,
            Target::Cpm => 0x0100,
            Target::Msx => 0xC000,
            Target::Cpc => 0x8000,
        }
    }

    /// Assembly for the `putchar` helper's platform-specific console write,
    /// with the character already loaded into `A`.
    pub fn putchar_body(self) -> &'static str {
        match self {
            Target::ZxSpectrum => "    rst 16",
            Target::Cpm => "    ld e, a\n    ld c, 2\n    call 5",
            Target::Msx => "    call 0x00A2",
            Target::Cpc => "    call 0xBB5A",
        }
    }
}
