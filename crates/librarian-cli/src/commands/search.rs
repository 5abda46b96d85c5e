//! Listing and searching entries

use anyhow::Result;
use clap::Args;

use librarian_core::{Filter, Library, LibraryResult, Query, SortKey};

use crate::output::Output;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Key matches this regex
    #[arg(short, long)]
    key: Option<String>,
    /// Title matches this regex
    #[arg(short, long)]
    title: Option<String>,
    /// Every word matches one of the authors
    #[arg(short, long)]
    author: Option<String>,
    /// Year, or inclusive range such as 2018-2020
    #[arg(short, long)]
    year: Option<String>,
    /// Journal or booktitle matches this regex
    #[arg(long)]
    venue: Option<String>,
    /// BibTeX entry type matches this regex
    #[arg(long = "type")]
    entry_type: Option<String>,
    /// Carries this tag
    #[arg(long)]
    tag: Option<String>,
    /// Sort by key, title, year, added or accessed
    #[arg(short, long, default_value_t = SortKey::Key)]
    sort: SortKey,
    /// Reverse the natural order of the sort key
    #[arg(short, long)]
    reverse: bool,
    /// Show at most this many entries
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

impl ListArgs {
    /// Build the query these arguments describe
    pub fn to_query(&self) -> LibraryResult<Query> {
        let mut query = Query::new();
        let regex_filters: [(&Option<String>, fn(&str) -> LibraryResult<Filter>); 5] = [
            (&self.key, Filter::key),
            (&self.title, Filter::title),
            (&self.author, Filter::author),
            (&self.venue, Filter::venue),
            (&self.entry_type, Filter::entry_type),
        ];
        for (value, build) in regex_filters {
            if let Some(pattern) = value {
                query = query.filter(build(pattern)?);
            }
        }
        if let Some(ref year) = self.year {
            query = query.filter(Filter::year(year)?);
        }
        if let Some(ref tag) = self.tag {
            query = query.filter(Filter::tag(tag));
        }

        let order = self.sort.default_order();
        let order = if self.reverse { order.reversed() } else { order };
        query = query.sort(self.sort, order);
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// List entries matching the filters
pub fn list(library: &Library, args: ListArgs, output: &Output) -> Result<()> {
    let query = args.to_query()?;
    let result = library.query(&query)?;
    output.print_hits(&result.hits);
    output.problems(&result.errors);
    Ok(())
}
