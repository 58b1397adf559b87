mod db_setup;
mod matcher;
mod output;
mod page_source;
mod recorder;
mod run;
mod sink;
#[cfg(test)]
mod tests;

pub use run::run;

pub(crate) use page_source::detect_input_kind;
