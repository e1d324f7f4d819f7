//! The world model: exactly one of a grid or a flow network.

use flowsim_types::WorldView;

use crate::grid::Grid;
use crate::network::Network;

/// Authoritative world state for one deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum World {
    /// A rectangular cell grid.
    Grid(Grid),
    /// A graph of nodes and pipes.
    Network(Network),
}

impl World {
    /// Short name of the active variant, for logs.
    pub const fn variant(&self) -> &'static str {
        match self {
            Self::Grid(_) => "grid",
            Self::Network(_) => "network",
        }
    }

    /// An owned copy of the contents, safe to hand to other tasks.
    pub fn view(&self) -> WorldView {
        match self {
            Self::Grid(grid) => WorldView::Grid { grid: grid.view() },
            Self::Network(network) => {
                let (nodes, pipes) = network.view();
                WorldView::Network { nodes, pipes }
            }
        }
    }
}

impl From<Grid> for World {
    fn from(grid: Grid) -> Self {
        Self::Grid(grid)
    }
}

impl From<Network> for World {
    fn from(network: Network) -> Self {
        Self::Network(network)
    }
}
