// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

#[cfg(test)]
mod fakes;
#[cfg(test)]
mod logging;
#[cfg(test)]
mod tests;
