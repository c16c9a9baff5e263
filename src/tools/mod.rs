//! Tools the model may call: schema/definition types, the registry, and the
//! weather lookup.

mod definition; // ToolDefinition, ToolParameters, builder
mod registry;
pub mod weather;

pub use definition::{ToolDefinition, ToolHandler, ToolParameters, ToolParametersBuilder};
pub use registry::ToolRegistry;
pub use weather::{build_weather_tool, WeatherClient, WEATHER_TOOL_NAME};
