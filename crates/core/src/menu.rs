//! Driver-facing mode selection shown on the steering wheel display.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::state_machine::DriveState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MenuIndex {
    Off = 0,
    Pit = 1,
    Performance = 2,
    Efficiency = 3,
    Debug = 4,
    Configuration = 5,
    FlappyBird = 6,
    Exit = 7,
}

impl MenuIndex {
    pub const FIRST: MenuIndex = MenuIndex::Off;
    pub const LAST: MenuIndex = MenuIndex::Exit;

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MenuIndex::Off),
            1 => Some(MenuIndex::Pit),
            2 => Some(MenuIndex::Performance),
            3 => Some(MenuIndex::Efficiency),
            4 => Some(MenuIndex::Debug),
            5 => Some(MenuIndex::Configuration),
            6 => Some(MenuIndex::FlappyBird),
            7 => Some(MenuIndex::Exit),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_u8(self as u8 + 1)
    }

    pub fn prev(self) -> Option<Self> {
        (self as u8).checked_sub(1).and_then(Self::from_u8)
    }

    /// Drive mode requested when this entry is selected. `None` for entries
    /// that only navigate the display.
    pub fn drive_state(self) -> Option<DriveState> {
        match self {
            MenuIndex::Off => Some(DriveState::NotDriving),
            MenuIndex::Pit => Some(DriveState::Pit),
            MenuIndex::Performance => Some(DriveState::Performance),
            MenuIndex::Efficiency => Some(DriveState::Efficiency),
            MenuIndex::Debug
            | MenuIndex::Configuration
            | MenuIndex::FlappyBird
            | MenuIndex::Exit => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MenuState {
    pub index: MenuIndex,
    /// Index changes are only accepted on the home screen.
    pub home_mode: bool,
}

impl MenuState {
    pub const INITIAL: MenuState = MenuState {
        index: MenuIndex::Off,
        home_mode: true,
    };
}

impl Default for MenuState {
    fn default() -> Self {
        Self::INITIAL
    }
}

pub struct Menu {
    state: Mutex<CriticalSectionRawMutex, Cell<MenuState>>,
}

impl Menu {
    pub const fn new() -> Self {
        Menu {
            state: Mutex::new(Cell::new(MenuState::INITIAL)),
        }
    }

    pub fn get(&self) -> MenuState {
        self.state.lock(|s| s.get())
    }

    /// Applies `f` to the menu state; returns the new state if it changed.
    fn update(&self, f: impl FnOnce(MenuState) -> MenuState) -> Option<MenuState> {
        self.state.lock(|s| {
            let old = s.get();
            let new = f(old);
            s.set(new);
            (new != old).then_some(new)
        })
    }

    pub fn increment(&self) -> Option<MenuState> {
        self.update(|s| match s.index.next() {
            Some(index) if s.home_mode => MenuState { index, ..s },
            _ => s,
        })
    }

    pub fn decrement(&self) -> Option<MenuState> {
        self.update(|s| match s.index.prev() {
            Some(index) if s.home_mode => MenuState { index, ..s },
            _ => s,
        })
    }

    /// Hands the highlighted drive mode to `request` and leaves the home
    /// screen if it succeeds. The check, the request and the clear happen
    /// in one critical section so a concurrent [`Menu::reset`] cannot
    /// interleave.
    pub(crate) fn select<E>(
        &self,
        request: impl FnOnce(DriveState) -> Result<(), E>,
    ) -> Result<Option<MenuState>, E> {
        self.state.lock(|s| {
            let menu = s.get();
            if !menu.home_mode {
                return Ok(None);
            }
            let Some(drive) = menu.index.drive_state() else {
                return Ok(None);
            };
            request(drive)?;
            let new = MenuState {
                home_mode: false,
                ..menu
            };
            s.set(new);
            Ok(Some(new))
        })
    }

    pub(crate) fn enter_home(&self) -> MenuState {
        self.state.lock(|s| {
            let new = MenuState {
                home_mode: true,
                ..s.get()
            };
            s.set(new);
            new
        })
    }

    pub(crate) fn reset(&self) -> MenuState {
        self.state.lock(|s| s.replace(MenuState::INITIAL));
        MenuState::INITIAL
    }
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}
