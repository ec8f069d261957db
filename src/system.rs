use std::fs;
use std::path::{PathBuf};

use tracing::{info};

use crate::chip8::{MEMORY_SIZE, ROM_BASE, FONT_ADDR, Memory, Registers, ReturnStack, Framebuffer};
use crate::error::{Error, Result};
use crate::host::{Host, Devices};
use crate::target::{Environment};
use crate::translate::{Cache, Options, Translator};

/** How to set up a [`System`]. */
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /** The program to run. */
    pub rom: PathBuf,
    /** Replaces the built-in font. */
    pub font: Option<PathBuf>,
    pub options: Options,
}

/**
 * A complete CHIP-8 machine: memory with a font and a program, the register
 * context, the return stack, the screen, and a [`Translator`] to run it.
 */
pub struct System {
    memory: Memory,
    registers: Registers,
    stack: ReturnStack,
    framebuffer: Framebuffer,
    translator: Translator,
}

impl System {
    pub fn new(options: Options) -> Self {
        System {
            memory: Memory::new(),
            registers: Registers::default(),
            stack: ReturnStack::default(),
            framebuffer: Framebuffer::new(),
            translator: Translator::new(Cache::new(), ROM_BASE).with_options(options),
        }
    }

    /** Constructs a `System` and loads the files named in `settings`. */
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut system = System::new(settings.options.clone());
        if let Some(font) = &settings.font {
            system.load_font(&fs::read(font)?)?;
        }
        system.load_rom(&fs::read(&settings.rom)?)?;
        info!(rom = %settings.rom.display(), "loaded");
        Ok(system)
    }

    /** Copies `rom` to [`ROM_BASE`]. */
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<()> {
        let max = MEMORY_SIZE - ROM_BASE as usize;
        if rom.len() > max {
            return Err(Error::RomTooLarge {len: rom.len(), max});
        }
        self.memory.load(ROM_BASE, rom);
        Ok(())
    }

    /** Copies `font` to [`FONT_ADDR`]. It must not reach [`ROM_BASE`]. */
    pub fn load_font(&mut self, font: &[u8]) -> Result<()> {
        let max = (ROM_BASE - FONT_ADDR) as usize;
        if font.len() > max {
            return Err(Error::FontTooLarge {len: font.len(), max});
        }
        self.memory.load(FONT_ADDR, font);
        Ok(())
    }

    pub fn memory(&self) -> &Memory { &self.memory }

    pub fn registers(&self) -> &Registers { &self.registers }

    pub fn framebuffer(&self) -> &Framebuffer { &self.framebuffer }

    pub fn translator(&self) -> &Translator { &self.translator }

    /** Runs the program from [`ROM_BASE`] until it halts. */
    pub fn run(&mut self, host: &mut dyn Host) -> Result<()> {
        host.init_framebuffer(self.framebuffer.width(), self.framebuffer.height())?;
        let mut env = Environment {
            memory: &mut self.memory,
            devices: Devices::new(&mut self.framebuffer, host),
        };
        self.translator.run(ROM_BASE, &mut self.registers, &mut self.stack, &mut env)?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::chip8::{FONT};
    use crate::error::{Fault};
    use crate::host::{HeadlessHost};

    #[test]
    fn rom_too_large() {
        let mut system = System::new(Options::default());
        assert!(system.load_rom(&[0; 0xE00]).is_ok());
        match system.load_rom(&[0; 0xE01]) {
            Err(Error::RomTooLarge {len: 0xE01, max: 0xE00}) => {},
            other => panic!("{:?}", other),
        }
        assert!(matches!(system.load_font(&[0; 0x201]), Err(Error::FontTooLarge {..})));
    }

    #[test]
    fn run() {
        let mut system = System::new(Options::default());
        assert_eq!(system.memory().byte(FONT_ADDR), FONT[0]);
        system.load_rom(&[0x60, 0x05, 0xF0, 0x29, 0xD1, 0x15, 0x12, 0x06]).unwrap();
        let mut host = HeadlessHost::new(0);
        system.run(&mut host).unwrap();
        assert_eq!(system.registers().v[0], 5);
        assert_eq!(system.registers().i, FONT_ADDR + 25);
        assert!(system.framebuffer().pixel(0, 0));
        assert_eq!(system.translator().statistics().compiles, 1);
    }

    #[test]
    fn fault() {
        let mut system = System::new(Options::default());
        system.load_rom(&[0x00, 0xEE]).unwrap();
        match system.run(&mut HeadlessHost::new(0)) {
            Err(Error::Fault(Fault::StackUnderflow)) => {},
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn files() {
        let dir = std::env::temp_dir().join(format!("c8jit-system-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let rom = dir.join("halt.ch8");
        fs::write(&rom, [0x12u8, 0x00]).unwrap();
        let font = dir.join("font.bin");
        fs::write(&font, [0xAAu8; 80]).unwrap();
        let settings = Settings {rom, font: Some(font), options: Options::default()};
        let system = System::from_settings(&settings).unwrap();
        assert_eq!(system.memory().byte(FONT_ADDR + 79), 0xAA);
        assert_eq!(system.memory().word(ROM_BASE), 0x1200);
        let missing = Settings {rom: dir.join("missing.ch8"), ..Settings::default()};
        assert!(matches!(System::from_settings(&missing), Err(Error::Io(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
