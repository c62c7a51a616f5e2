//! Figures and summaries written by the analysis commands.

pub mod plots;
pub mod summary;

pub use plots::{
    plot_density, plot_last_fit, plot_radius_curves, plot_slope_series, plot_trajectories,
    plot_verification,
};
pub use summary::{
    format_text_summary, summary_file_name, write_json_summary, IsochronySummary,
    SummaryMetadata,
};
