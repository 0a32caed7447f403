pub mod xy2_100;
