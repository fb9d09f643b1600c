/*
sparsepad, to bloat and trim Android sparse images: pretty printing module
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

pub(crate) fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>().join(" ")
}

pub(crate) fn try_into_human_readable<N: Into<u64>>(original: N) -> (f64, char) {
    let mut number = original.into() as f64;
    const SUFFIXES: [char; 8] = ['B', 'K', 'M', 'G', 'T', 'P', 'E', 'Z' ];
    let mut suffix_id = 0;
    while number >= 1024.0 && suffix_id < SUFFIXES.len() - 1 {
        number /= 1024.0;
        suffix_id += 1;
    }
    (number, SUFFIXES[suffix_id])
}

pub(crate) fn human_readable<N: Into<u64>>(original: N) -> String {
    let (number, suffix) = try_into_human_readable(original);
    format!("{:.2}{}", number, suffix)
}
