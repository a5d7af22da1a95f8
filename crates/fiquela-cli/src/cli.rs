use crate::formatter::Formatter;
use crate::{CliResult, Config};
use fiquela_common::QueryConfig;
use fiquela_query::{JsonFileSource, Parser, Query, RecordSource};
use fiquela_value::Record;
use tracing::debug;

pub struct Cli {
    source: JsonFileSource,
    formatter: Formatter,
    query_config: QueryConfig,
}

impl Cli {
    pub fn new(config: Config) -> Self {
        let source = match &config.file {
            Some(path) => JsonFileSource::new(path),
            None => JsonFileSource::unbound(),
        };
        Self {
            source,
            formatter: Formatter::new(&config.format, config.color),
            query_config: config.fiq.query,
        }
    }

    fn parse(&self, text: &str) -> CliResult<Query> {
        let mut query = Query::with_config(&self.query_config);
        Parser::parse_into(text, &mut query)?;
        Ok(query)
    }

    /// 执行查询并返回全部输出行
    pub fn run_query(&self, text: &str) -> CliResult<Vec<Record>> {
        let query = self.parse(text)?;
        debug!(source = %self.source.describe(), "running query");
        Ok(query.execute(&self.source)?.fetch_all(None)?)
    }

    pub fn explain(&self, text: &str) -> CliResult<String> {
        Ok(self.parse(text)?.explain()?)
    }

    pub fn execute(&self, text: &str) -> CliResult<()> {
        let rows = self.run_query(text)?;
        print!("{}", self.formatter.render(&rows));
        Ok(())
    }
}
