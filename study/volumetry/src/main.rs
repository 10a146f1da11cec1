//! 海马体体积批量测量与纵向分析入口.
//!
//! 所有运行配置均来自环境变量, 见 `utils::loader`.

mod result;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Info).expect("Logger init error");
    runner::run().analyze();
}
