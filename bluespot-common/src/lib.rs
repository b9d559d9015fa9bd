/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 14/03/2023
Last Modified: 22/05/2025
License: MIT
*/

pub mod algorithms;
pub mod configs;
pub mod structures;
pub mod utils;
