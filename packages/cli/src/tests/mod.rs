// ABOUTME: Unit tests for the MarketWise server library
// ABOUTME: Configuration parsing and catalog import
