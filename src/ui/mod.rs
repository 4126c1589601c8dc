//! 终端输出：把运行事件流渲染到控制台（crossterm 着色）

pub mod console;

pub use console::{spawn_console, ConsoleRenderer};
