/*
sparsepad, to bloat and trim Android sparse images: progress module
Copyright (C) 2024-present Guoxin "7Ji" Pu

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as
published by the Free Software Foundation, either version 3 of the
License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::Result;

pub(crate) const TEMPLATE_CHUNKS: &str =
    "{prefix} => [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}";

fn progress_style_with_template<S: AsRef<str>>(template: S)
    -> Result<ProgressStyle>
{
    let template = template.as_ref();
    match ProgressStyle::with_template(template) {
        Ok(style) => Ok(style),
        Err(e) => {
            tracing::error!(
                "Failed to create progress bar style from template '{}': {}",
                template, e
            );
            Err(e.into())
        }
    }
}

/// A ticking bar counting chunks, or a hidden one when quiet
pub(crate) fn progress_bar_chunks<S>(prefix: S, visible: bool)
    -> Result<ProgressBar>
where
    S: Into<String>,
{
    if ! visible {
        return Ok(ProgressBar::hidden())
    }
    let style = progress_style_with_template(TEMPLATE_CHUNKS)?;
    let bar = ProgressBar::new(0)
        .with_style(style)
        .with_prefix(prefix.into());
    bar.enable_steady_tick(Duration::from_secs(1));
    Ok(bar)
}
