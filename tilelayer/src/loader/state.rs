//! Load states emitted for one tile request.

use crate::fetch::FetchError;
use crate::tile::{AncestorRegion, EncodedImage, TileAddress};

/// Progress of one tile request.
///
/// A request moves `Loading → (LowRes)? → (HighRes | Failed)` and never
/// backwards; [`StateSequence`] enforces that per request.
#[derive(Debug, Clone, PartialEq)]
pub enum TileLoadState {
    /// Request accepted, nothing to show yet
    Loading,

    /// Magnified ancestor tile standing in for the real one.
    ///
    /// Draw `region` of `image` (a tile of `ancestor`) scaled up to the
    /// requested tile's rectangle.
    LowRes {
        image: EncodedImage,
        region: AncestorRegion,
        ancestor: TileAddress,
    },

    /// Full-resolution tile
    HighRes(EncodedImage),

    /// The tile could not be loaded
    Failed(FetchError),
}

impl TileLoadState {
    /// Position in the load ordering. Terminal states share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            TileLoadState::Loading => 0,
            TileLoadState::LowRes { .. } => 1,
            TileLoadState::HighRes(_) | TileLoadState::Failed(_) => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TileLoadState::HighRes(_) | TileLoadState::Failed(_))
    }

    /// Image to draw, if any.
    pub fn image(&self) -> Option<&EncodedImage> {
        match self {
            TileLoadState::LowRes { image, .. } | TileLoadState::HighRes(image) => Some(image),
            TileLoadState::Loading | TileLoadState::Failed(_) => None,
        }
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            TileLoadState::Loading => "loading",
            TileLoadState::LowRes { .. } => "low_res",
            TileLoadState::HighRes(_) => "high_res",
            TileLoadState::Failed(_) => "failed",
        }
    }
}

/// Guard that only lets states through in increasing rank.
#[derive(Debug, Default)]
pub struct StateSequence {
    last_rank: Option<u8>,
}

impl StateSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` if it moves the request forward.
    ///
    /// Returns `false` (and records nothing) for a repeat, a regression, or
    /// anything after a terminal state.
    pub fn advance(&mut self, state: &TileLoadState) -> bool {
        let rank = state.rank();
        match self.last_rank {
            Some(last) if rank <= last => false,
            _ => {
                self.last_rank = Some(rank);
                true
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.last_rank == Some(2)
    }
}
